//! Branch registry

mod service;

pub use service::{find_code, BranchService};

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Branch {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn validate_branch_code(code: &str) -> Result<(), validator::ValidationError> {
    let well_formed = code.len() >= 3
        && code.len() <= 10
        && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_branch_code"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBranchRequest {
    #[validate(custom = "validate_branch_code")]
    pub code: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub address: Option<String>,
}

/// Name and address edit. The code is embedded in every identifier the
/// branch has issued and cannot change.
#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateBranchRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_code_rules() {
        assert!(validate_branch_code("NRB").is_ok());
        assert!(validate_branch_code("HQ01").is_ok());
        assert!(validate_branch_code("HQ").is_err());
        assert!(validate_branch_code("nrb").is_err());
        assert!(validate_branch_code("NR-B").is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateBranchRequest {
            code: "KSM".to_string(),
            name: "Kisumu".to_string(),
            address: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_update_request_rejects_blank_name() {
        let request = UpdateBranchRequest {
            name: Some(String::new()),
            address: None,
        };
        assert!(request.validate().is_err());
        assert!(UpdateBranchRequest::default().validate().is_ok());
    }

    #[test]
    fn test_update_request_ignores_code() {
        let request: UpdateBranchRequest =
            serde_json::from_str(r#"{"code":"XYZ","name":"Mombasa Road"}"#).unwrap();
        assert_eq!(request.name.as_deref(), Some("Mombasa Road"));
    }
}
