//! Customer route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/customers", get(list_customers).post(create_customer))
        .route("/api/customers/:id", get(get_customer).put(update_customer))
        .route("/api/customers/:id/kyc", put(update_kyc))
        .route("/api/customers/:id/risk-profile", put(update_risk_profile))
        .route("/api/customers/:id/activate", post(activate_customer))
        .route("/api/customers/:id/blacklist", post(blacklist_customer))
        .route("/api/customers/:id/accounts", get(list_customer_accounts))
}
