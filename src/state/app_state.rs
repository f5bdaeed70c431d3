//! Application state shared across handlers

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::account::AccountService;
use crate::auth::TokenVerifier;
use crate::branch::BranchService;
use crate::config::Config;
use crate::customer::CustomerService;
use crate::loan::LoanService;

/// Default deadline for one core operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDeadline(pub Duration);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub customer_service: Arc<CustomerService>,
    pub account_service: Arc<AccountService>,
    pub branch_service: Arc<BranchService>,
    pub token_verifier: Arc<TokenVerifier>,
    pub deadline: OperationDeadline,
    pub db_pool: PgPool,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: &Config) -> Self {
        Self {
            loan_service: Arc::new(LoanService::new(db_pool.clone())),
            customer_service: Arc::new(CustomerService::new(db_pool.clone())),
            account_service: Arc::new(AccountService::new(db_pool.clone())),
            branch_service: Arc::new(BranchService::new(db_pool.clone())),
            token_verifier: Arc::new(TokenVerifier::new(&config.jwt_secret)),
            deadline: OperationDeadline(config.operation_timeout()),
            db_pool,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<CustomerService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.customer_service.clone()
    }
}

impl FromRef<AppState> for Arc<AccountService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.account_service.clone()
    }
}

impl FromRef<AppState> for Arc<BranchService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.branch_service.clone()
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.token_verifier.clone()
    }
}

impl FromRef<AppState> for OperationDeadline {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.deadline
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}
