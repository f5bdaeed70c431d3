//! Customer and KYC models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "customer_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    Prospect,
    Active,
    Inactive,
    Blacklisted,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "kyc_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Pending,
    Incomplete,
    Complete,
    Expired,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "risk_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub customer_id: String, // Branch-scoped human-readable code
    pub branch_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub status: CustomerStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct KycProfile {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: KycStatus,
    pub has_national_id: bool,
    pub has_proof_of_address: bool,
    pub has_photo_proof: bool,
    pub has_income_proof: bool,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KycProfile {
    /// Identity, address and photo are enough for KYC; income proof is
    /// only demanded by product eligibility.
    pub fn identity_documents_present(&self) -> bool {
        self.has_national_id && self.has_proof_of_address && self.has_photo_proof
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct RiskProfile {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub risk_level: RiskLevel,
    pub credit_score: Option<i32>,
    pub delinquency_history: bool,
    pub multiple_borrowing: bool,
    pub political_exposure: bool,
    pub high_risk_occupation: bool,
    pub assessment_notes: Option<String>,
    pub assessed_by: Option<Uuid>,
    pub assessed_at: Option<DateTime<Utc>>,
    pub next_review_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetails {
    #[serde(flatten)]
    pub customer: Customer,
    pub kyc: Option<KycProfile>,
    pub risk: Option<RiskProfile>,
}

/// Query parameters for listing customers
#[derive(Debug, Deserialize, Default)]
pub struct ListCustomersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Matches customer code, names, email, phone or national ID
    pub search: Option<String>,
    pub status: Option<CustomerStatus>,
    pub branch_id: Option<Uuid>,
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Serialize)]
pub struct CustomerPage {
    pub data: Vec<Customer>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    pub branch_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 4, max = 40))]
    pub national_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
}

/// Profile edit; omitted fields keep their stored value. Status moves only
/// through activation and blacklisting.
#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateCustomerRequest {
    pub branch_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 4, max = 40))]
    pub national_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRiskProfileRequest {
    pub risk_level: RiskLevel,
    #[validate(range(min = 0, max = 1000))]
    pub credit_score: Option<i32>,
    pub delinquency_history: Option<bool>,
    pub multiple_borrowing: Option<bool>,
    pub political_exposure: Option<bool>,
    pub high_risk_occupation: Option<bool>,
    #[validate(length(max = 2000))]
    pub assessment_notes: Option<String>,
}

/// Document checklist update; omitted flags keep their stored value
#[derive(Debug, Deserialize, Default)]
pub struct UpdateKycRequest {
    pub has_national_id: Option<bool>,
    pub has_proof_of_address: Option<bool>,
    pub has_photo_proof: Option<bool>,
    pub has_income_proof: Option<bool>,
}
