use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "product_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductKind {
    Savings,
    Current,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "product_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "account_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Dormant,
    Suspended,
    Closed,
}

/// Status change requested on an open account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    Activate,
    Suspend,
    Reactivate,
    Close,
}

/// What an `account_history` row records
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "account_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountEvent {
    Activated,
    Suspended,
    Reactivated,
    Closed,
}

impl AccountAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountAction::Activate => "activate_account",
            AccountAction::Suspend => "suspend_account",
            AccountAction::Reactivate => "reactivate_account",
            AccountAction::Close => "close_account",
        }
    }

    pub fn event(&self) -> AccountEvent {
        match self {
            AccountAction::Activate => AccountEvent::Activated,
            AccountAction::Suspend => AccountEvent::Suspended,
            AccountAction::Reactivate => AccountEvent::Reactivated,
            AccountAction::Close => AccountEvent::Closed,
        }
    }

    /// Status the account moves to, or why it cannot
    pub fn apply(&self, from: AccountStatus) -> DomainResult<AccountStatus> {
        use AccountStatus::*;

        let refused =
            |reason: &str| -> DomainResult<AccountStatus> { Err(DomainError::validation(reason.to_string())) };
        match (self, from) {
            (_, Closed) => refused("account is closed"),
            (AccountAction::Activate, Active) => refused("account is already active"),
            (AccountAction::Activate, _) => Ok(Active),
            (AccountAction::Suspend, Suspended) => refused("account is already suspended"),
            (AccountAction::Suspend, _) => Ok(Suspended),
            (AccountAction::Reactivate, Suspended) => Ok(Active),
            (AccountAction::Reactivate, _) => refused("only a suspended account can be reactivated"),
            (AccountAction::Close, _) => Ok(Closed),
        }
    }

    pub fn needs_reason(&self) -> bool {
        matches!(self, AccountAction::Suspend | AccountAction::Close)
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub kind: ProductKind,
    pub status: ProductStatus,
    pub allow_multiple: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub status: AccountStatus,
    pub opened_by: Uuid,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct AccountHistory {
    pub id: Uuid,
    pub account_id: Uuid,
    pub action: AccountEvent,
    pub old_status: AccountStatus,
    pub new_status: AccountStatus,
    pub reason: Option<String>,
    pub performed_by: Uuid,
    pub performed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub kind: ProductKind,
    #[serde(default)]
    pub allow_multiple: bool,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub customer_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub customer_id: Uuid,
    pub product_id: Uuid,
}

/// Reason for a suspension or closure
#[derive(Debug, Deserialize, Validate, Default)]
pub struct AccountStatusChange {
    #[validate(length(min = 1, max = 500))]
    pub reason: Option<String>,
}
