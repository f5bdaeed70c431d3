use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::ApiResponse;
use crate::context::RequestContext;
use crate::customer::{
    CreateCustomerRequest, Customer, CustomerDetails, CustomerPage, CustomerService, KycProfile,
    ListCustomersQuery, RiskProfile, UpdateCustomerRequest, UpdateKycRequest,
    UpdateRiskProfileRequest,
};
use crate::error::ApiError;

pub async fn create_customer(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Customer>>), ApiError> {
    request.validate()?;
    let customer = service.create(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(customer))))
}

pub async fn get_customer(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerDetails>>, ApiError> {
    let details = service.get(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(details)))
}

pub async fn list_customers(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<ApiResponse<CustomerPage>>, ApiError> {
    let page = service.list(&ctx, query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn update_customer(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    request.validate()?;
    let customer = service.update(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(customer)))
}

pub async fn update_risk_profile(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRiskProfileRequest>,
) -> Result<Json<ApiResponse<RiskProfile>>, ApiError> {
    request.validate()?;
    let profile = service.update_risk_profile(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn update_kyc(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateKycRequest>,
) -> Result<Json<ApiResponse<KycProfile>>, ApiError> {
    let profile = service.update_kyc(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn activate_customer(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    let customer = service.activate(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(customer)))
}

pub async fn blacklist_customer(
    State(service): State<Arc<CustomerService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    let customer = service.blacklist(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(customer)))
}
