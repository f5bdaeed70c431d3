use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::ApiResponse;
use crate::branch::{Branch, BranchService, CreateBranchRequest, UpdateBranchRequest};
use crate::context::RequestContext;
use crate::error::ApiError;

pub async fn create_branch(
    State(service): State<Arc<BranchService>>,
    ctx: RequestContext,
    Json(request): Json<CreateBranchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Branch>>), ApiError> {
    request.validate()?;
    let branch = service.create(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(branch))))
}

pub async fn update_branch(
    State(service): State<Arc<BranchService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBranchRequest>,
) -> Result<Json<ApiResponse<Branch>>, ApiError> {
    request.validate()?;
    let branch = service.update(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(branch)))
}

pub async fn get_branch(
    State(service): State<Arc<BranchService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Branch>>, ApiError> {
    let branch = service.get(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(branch)))
}

pub async fn list_branches(
    State(service): State<Arc<BranchService>>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<Branch>>>, ApiError> {
    let branches = service.list(&ctx).await?;
    Ok(Json(ApiResponse::ok(branches)))
}
