//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", get(list_loans).post(create_loan))
        .route("/api/loans/:id", get(get_loan).put(update_loan))
        .route("/api/loans/:id/schedule", get(get_schedule))
        .route("/api/loans/:id/submit", post(submit_loan))
        .route(
            "/api/loans/:id/appraisal",
            post(create_appraisal).put(update_appraisal),
        )
        .route("/api/loans/:id/appraisal/complete", post(complete_appraisal))
        .route("/api/loans/:id/decisions", post(record_decision))
        .route("/api/loans/:id/disbursement", post(create_disbursement))
        .route(
            "/api/loans/:id/disbursement/verify",
            post(verify_disbursement),
        )
        .route(
            "/api/loans/:id/disbursement/complete",
            post(complete_disbursement),
        )
        .route("/api/loans/:id/activate", post(activate_loan))
        .route("/api/loans/:id/close", post(close_loan))
}
