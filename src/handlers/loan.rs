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
use crate::error::ApiError;
use crate::loan::{
    Appraisal, AppraisalRequest, ApprovalDecision, ApprovalDecisionRequest, CloseLoanRequest,
    CompleteDisbursementRequest, CreateDisbursementRequest, CreateLoanRequest, Disbursement,
    DisbursementCompletion, ListLoansQuery, Loan, LoanAggregate, LoanClosure, LoanPage,
    LoanService, RepaymentInstallment, UpdateLoanRequest, VerifyDisbursementRequest,
};

type Created<T> = (StatusCode, Json<ApiResponse<T>>);

pub async fn create_loan(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Json(request): Json<CreateLoanRequest>,
) -> Result<Created<Loan>, ApiError> {
    request.validate()?;
    let loan = service.create(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan))))
}

pub async fn list_loans(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<ApiResponse<LoanPage>>, ApiError> {
    let page = service.list(&ctx, query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_loan(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanAggregate>>, ApiError> {
    let aggregate = service.get(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(aggregate)))
}

pub async fn update_loan(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLoanRequest>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    request.validate()?;
    let loan = service.update(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn get_schedule(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<RepaymentInstallment>>>, ApiError> {
    let schedule = service.schedule(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(schedule)))
}

pub async fn submit_loan(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    let loan = service.submit(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn create_appraisal(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<AppraisalRequest>,
) -> Result<Created<Appraisal>, ApiError> {
    request.validate()?;
    let appraisal = service.create_appraisal(&ctx, id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(appraisal))))
}

pub async fn update_appraisal(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<AppraisalRequest>,
) -> Result<Json<ApiResponse<Appraisal>>, ApiError> {
    request.validate()?;
    let appraisal = service.update_appraisal(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(appraisal)))
}

pub async fn complete_appraisal(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Appraisal>>, ApiError> {
    let appraisal = service.complete_appraisal(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(appraisal)))
}

pub async fn record_decision(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<ApprovalDecisionRequest>,
) -> Result<Created<ApprovalDecision>, ApiError> {
    request.validate()?;
    let decision = service.record_decision(&ctx, id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(decision))))
}

pub async fn create_disbursement(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateDisbursementRequest>,
) -> Result<Created<Disbursement>, ApiError> {
    request.validate()?;
    let disbursement = service.create_disbursement(&ctx, id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(disbursement))))
}

pub async fn verify_disbursement(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyDisbursementRequest>,
) -> Result<Json<ApiResponse<Disbursement>>, ApiError> {
    let disbursement = service.verify_disbursement(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(disbursement)))
}

pub async fn complete_disbursement(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteDisbursementRequest>,
) -> Result<Json<ApiResponse<DisbursementCompletion>>, ApiError> {
    let completion = service.complete_disbursement(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(completion)))
}

pub async fn activate_loan(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    let loan = service.activate(&ctx, id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn close_loan(
    State(service): State<Arc<LoanService>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(request): Json<CloseLoanRequest>,
) -> Result<Json<ApiResponse<LoanClosure>>, ApiError> {
    request.validate()?;
    let closure = service.close(&ctx, id, request).await?;
    Ok(Json(ApiResponse::ok(closure)))
}
