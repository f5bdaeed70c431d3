//! Branch route definitions

use axum::{routing::get, Router};

use crate::handlers::*;
use crate::state::AppState;

pub fn branch_routes() -> Router<AppState> {
    Router::new()
        .route("/api/branches", get(list_branches).post(create_branch))
        .route("/api/branches/:id", get(get_branch).put(update_branch))
}
