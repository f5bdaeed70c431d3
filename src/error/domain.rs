//! Domain error taxonomy shared by the core services

use thiserror::Error;

use crate::loan::{LoanAction, LoanStatus};

/// SQLSTATE codes that map onto domain kinds
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors raised by the core services.
///
/// Everything except `Conflict`, `Unavailable`, `Invariant` and `Database` is an
/// expected, caller-recoverable outcome and is surfaced unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot {action} a loan in status {status}")]
    InvalidTransition {
        action: LoanAction,
        status: LoanStatus,
    },

    #[error("cannot {action} a loan in status {status}: {reason}")]
    Forbidden {
        action: LoanAction,
        status: LoanStatus,
        reason: String,
    },

    #[error("customer is not eligible: {}", reasons.join("; "))]
    IneligibleCustomer { reasons: Vec<String> },

    #[error("appraisal is missing a recommendation or recommended amount")]
    IncompleteAppraisal,

    #[error("{0} already exists")]
    DuplicateResource(String),

    #[error("{0}")]
    Validation(String),

    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    pub fn forbidden(action: LoanAction, status: LoanStatus, reason: impl Into<String>) -> Self {
        DomainError::Forbidden {
            action,
            status,
            reason: reason.into(),
        }
    }

    /// Only transaction conflicts are safe to re-run: nothing was committed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                entity: "record",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(ref db_err) => match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => DomainError::DuplicateResource(
                    db_err
                        .constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| "record".to_string()),
                ),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    DomainError::Conflict(db_err.message().to_string())
                }
                _ => DomainError::Database(err.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DomainError::Unavailable(err.to_string())
            }
            _ => DomainError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(DomainError::Conflict("x".into()).is_retryable());
        assert!(!DomainError::Unavailable("x".into()).is_retryable());
        assert!(!DomainError::IncompleteAppraisal.is_retryable());
        assert!(!DomainError::InvalidTransition {
            action: LoanAction::Submit,
            status: LoanStatus::Closed,
        }
        .is_retryable());
    }

    #[test]
    fn test_messages_carry_status_and_action() {
        let err = DomainError::InvalidTransition {
            action: LoanAction::Submit,
            status: LoanStatus::Approved,
        };
        let msg = err.to_string();
        assert!(msg.contains("submit"));
        assert!(msg.contains("APPROVED"));
    }

    #[test]
    fn test_ineligible_lists_every_reason() {
        let err = DomainError::IneligibleCustomer {
            reasons: vec!["customer is blacklisted".into(), "KYC is incomplete".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("blacklisted"));
        assert!(msg.contains("incomplete"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            DomainError::from(sqlx::Error::RowNotFound),
            DomainError::NotFound { .. }
        ));
        assert!(matches!(
            DomainError::from(sqlx::Error::PoolTimedOut),
            DomainError::Unavailable(_)
        ));
    }
}
