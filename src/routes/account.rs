//! Product and account route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/accounts", post(open_account))
        .route("/api/accounts/eligibility", get(check_eligibility))
        .route("/api/accounts/by-number/:number", get(find_account_by_number))
        .route("/api/accounts/:id/history", get(account_history))
        .route("/api/accounts/:id/activate", post(activate_account))
        .route("/api/accounts/:id/suspend", post(suspend_account))
        .route("/api/accounts/:id/reactivate", post(reactivate_account))
        .route("/api/accounts/:id/close", post(close_account))
}
