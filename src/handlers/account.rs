use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::ApiResponse;
use crate::account::{
    Account, AccountHistory, AccountService, AccountStatusChange, CreateProductRequest,
    EligibilityQuery, OpenAccountRequest, Product,
};
use crate::context::RequestContext;
use crate::eligibility::EligibilityReport;
use crate::error::ApiError;

pub async fn create_product(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    request.validate()?;
    let product = service.create_product(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

pub async fn list_products(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<Product>>>, ApiError> {
    let products = service.list_products(&ctx).await?;
    Ok(Json(ApiResponse::ok(products)))
}

pub async fn check_eligibility(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Query(query): Query<EligibilityQuery>,
) -> Result<Json<ApiResponse<EligibilityReport>>, ApiError> {
    let report = service
        .check_eligibility(&ctx, query.customer_id, query.product_id)
        .await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn open_account(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Account>>), ApiError> {
    let account = service.open_account(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(account))))
}

pub async fn list_customer_accounts(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Account>>>, ApiError> {
    let accounts = service.list_customer_accounts(&ctx, customer_id).await?;
    Ok(Json(ApiResponse::ok(accounts)))
}

pub async fn find_account_by_number(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(account_number): Path<String>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let account = service.find_by_number(&ctx, &account_number).await?;
    Ok(Json(ApiResponse::ok(account)))
}

pub async fn account_history(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AccountHistory>>>, ApiError> {
    let history = service.history(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(history)))
}

pub async fn activate_account(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let account = service.activate(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(account)))
}

pub async fn suspend_account(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(change): Json<AccountStatusChange>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    change.validate()?;
    let account = service.suspend(&ctx, id, change).await?;
    Ok(Json(ApiResponse::ok(account)))
}

pub async fn reactivate_account(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let account = service.reactivate(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(account)))
}

pub async fn close_account(
    State(service): State<Arc<AccountService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(change): Json<AccountStatusChange>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    change.validate()?;
    let account = service.close(&ctx, id, change).await?;
    Ok(Json(ApiResponse::ok(account)))
}
