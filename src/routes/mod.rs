//! Route definitions for the microfinance API

mod account;
mod branch;
mod customer;
mod loan;

pub use account::account_routes;
pub use branch::branch_routes;
pub use customer::customer_routes;
pub use loan::loan_routes;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::middleware::{self, REQUEST_ID_HEADER};
use crate::middleware::auth::REQUEST_TIMEOUT_HEADER;
use crate::state::AppState;

/// Assemble the full application router
pub fn build_router(state: AppState, config: &Config) -> Router {
    let security = middleware::SecurityPolicy::for_environment(&config.environment);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(branch_routes())
        .merge(customer_routes())
        .merge(account_routes())
        .merge(loan_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(security, middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(config.cors_allowed_origins.as_deref()))
}

async fn root() -> &'static str {
    "Microfinance Core API Server"
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

/// Health check endpoint
async fn health_check(State(pool): State<PgPool>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code, database) = match crate::db::check_health(&pool).await {
        Ok(()) => ("healthy", StatusCode::OK, "connected".to_string()),
        Err(e) => (
            "unhealthy",
            StatusCode::SERVICE_UNAVAILABLE,
            format!("error: {}", e),
        ),
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            database,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(REQUEST_TIMEOUT_HEADER),
        ])
}
