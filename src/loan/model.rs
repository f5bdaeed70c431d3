//! Loan aggregate models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Loan status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Draft,
    ApplicationSubmitted,
    UnderAppraisal,
    PendingApproval,
    Approved,
    ApprovedWithConditions,
    Rejected,
    Disbursed,
    Active,
    Overdue,
    Closed,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 11] = [
        LoanStatus::Draft,
        LoanStatus::ApplicationSubmitted,
        LoanStatus::UnderAppraisal,
        LoanStatus::PendingApproval,
        LoanStatus::Approved,
        LoanStatus::ApprovedWithConditions,
        LoanStatus::Rejected,
        LoanStatus::Disbursed,
        LoanStatus::Active,
        LoanStatus::Overdue,
        LoanStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Draft => "DRAFT",
            LoanStatus::ApplicationSubmitted => "APPLICATION_SUBMITTED",
            LoanStatus::UnderAppraisal => "UNDER_APPRAISAL",
            LoanStatus::PendingApproval => "PENDING_APPROVAL",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::ApprovedWithConditions => "APPROVED_WITH_CONDITIONS",
            LoanStatus::Rejected => "REJECTED",
            LoanStatus::Disbursed => "DISBURSED",
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Overdue => "OVERDUE",
            LoanStatus::Closed => "CLOSED",
        }
    }

    /// Statuses in which `approved_amount` must be set
    pub fn carries_approved_amount(&self) -> bool {
        matches!(
            self,
            LoanStatus::Approved
                | LoanStatus::ApprovedWithConditions
                | LoanStatus::Disbursed
                | LoanStatus::Active
                | LoanStatus::Overdue
                | LoanStatus::Closed
        )
    }

    /// Statuses in which a repayment schedule must exist
    pub fn carries_schedule(&self) -> bool {
        matches!(
            self,
            LoanStatus::Disbursed | LoanStatus::Active | LoanStatus::Overdue | LoanStatus::Closed
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "interest_rate_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterestRateType {
    Flat,
    ReducingBalance,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_frequency", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepaymentFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_purpose", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanPurpose {
    Agriculture,
    Trade,
    Services,
    Manufacturing,
    Housing,
    Education,
    Consumption,
    Other,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "appraisal_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppraisalStatus {
    InProgress,
    Completed,
}

/// Officer tier that issued an approval decision
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "approval_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalLevel {
    LoanOfficer,
    BranchManager,
    CreditCommittee,
    Board,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "approval_decision_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecisionType {
    Approved,
    ApprovedWithConditions,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "disbursement_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisbursementMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "disbursement_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisbursementStatus {
    Pending,
    Processing,
    Completed,
}

/// Loan model (aggregate root)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Loan {
    pub id: Uuid,
    pub loan_id: String, // Branch-scoped human-readable code
    pub customer_id: Uuid,
    pub loan_officer_id: Uuid,
    pub branch_id: Uuid,
    pub product_name: String,
    pub purpose: LoanPurpose,
    pub requested_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub interest_rate: Decimal, // Annual, percent
    pub interest_rate_type: InterestRateType,
    pub tenure: i32, // Months
    pub repayment_frequency: RepaymentFrequency,
    pub status: LoanStatus,
    pub approval_date: Option<DateTime<Utc>>,
    pub disbursement_date: Option<DateTime<Utc>>,
    pub closed_date: Option<DateTime<Utc>>,
    pub final_rating: Option<String>,
    pub closure_notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Underwriting assessment, at most one per loan
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Appraisal {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub status: AppraisalStatus,
    pub site_visit_date: Option<NaiveDate>,
    pub site_visit_notes: Option<String>,
    pub site_visit_photos: Vec<String>,
    pub monthly_income: Option<Decimal>,
    pub monthly_expenses: Option<Decimal>,
    pub net_cash_flow: Option<Decimal>,
    pub debt_service_ratio: Option<Decimal>,
    pub credit_score: Option<i32>,
    pub scoring_notes: Option<String>,
    pub recommended_amount: Option<Decimal>,
    pub recommended_tenure: Option<i32>,
    pub appraisal_notes: Option<String>,
    pub recommendation: Option<String>,
    pub appraised_by: Uuid,
    pub appraised_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only approval audit record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub level: ApprovalLevel,
    pub decision: ApprovalDecisionType,
    pub approved_amount: Option<Decimal>,
    pub conditions: Vec<String>,
    pub notes: Option<String>,
    pub minutes: Option<String>,
    pub approved_by: Uuid,
    pub approved_at: DateTime<Utc>,
}

/// Release of approved funds, at most one per loan
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Disbursement {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub method: DisbursementMethod,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub bank_name: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub status: DisbursementStatus,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub disbursed_by: Option<Uuid>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the repayment schedule
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct RepaymentInstallment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub installment_number: i32,
    pub due_date: NaiveDate,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub total_amount: Decimal,
    pub outstanding_principal: Decimal,
    pub outstanding_interest: Decimal,
    pub outstanding_total: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A loan together with the children it owns.
///
/// Services load only the slices an operation needs; a child collection that
/// was not loaded is indistinguishable from an empty one, so each transition
/// documents which slices it reads.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LoanAggregate {
    pub loan: Loan,
    pub appraisal: Option<Appraisal>,
    /// Oldest first; the last entry is the latest decision
    pub decisions: Vec<ApprovalDecision>,
    pub disbursement: Option<Disbursement>,
    pub schedule: Vec<RepaymentInstallment>,
}

impl LoanAggregate {
    pub fn new(loan: Loan) -> Self {
        Self {
            loan,
            appraisal: None,
            decisions: Vec::new(),
            disbursement: None,
            schedule: Vec::new(),
        }
    }

    pub fn with_appraisal(mut self, appraisal: Option<Appraisal>) -> Self {
        self.appraisal = appraisal;
        self
    }

    pub fn with_decisions(mut self, decisions: Vec<ApprovalDecision>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn with_disbursement(mut self, disbursement: Option<Disbursement>) -> Self {
        self.disbursement = disbursement;
        self
    }

    pub fn with_schedule(mut self, schedule: Vec<RepaymentInstallment>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn status(&self) -> LoanStatus {
        self.loan.status
    }
}

fn validate_positive(value: &Decimal) -> Result<(), validator::ValidationError> {
    if value.is_sign_positive() && !value.is_zero() {
        Ok(())
    } else {
        Err(validator::ValidationError::new("must_be_positive"))
    }
}

fn validate_non_negative(value: &Decimal) -> Result<(), validator::ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        Err(validator::ValidationError::new("must_not_be_negative"))
    } else {
        Ok(())
    }
}

/// Request to open a loan application
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateLoanRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub product_name: String,
    pub purpose: LoanPurpose,
    #[validate(custom = "validate_positive")]
    pub requested_amount: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub interest_rate: Decimal,
    pub interest_rate_type: InterestRateType,
    #[validate(range(min = 1, max = 60))]
    pub tenure: i32,
    pub repayment_frequency: RepaymentFrequency,
    pub loan_officer_id: Uuid,
    pub branch_id: Uuid,
}

/// Edit of a DRAFT loan; status is deliberately absent
#[derive(Debug, Deserialize, Validate, Clone, Default)]
pub struct UpdateLoanRequest {
    #[validate(length(min = 1, max = 120))]
    pub product_name: Option<String>,
    pub purpose: Option<LoanPurpose>,
    #[validate(custom = "validate_positive")]
    pub requested_amount: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub interest_rate: Option<Decimal>,
    pub interest_rate_type: Option<InterestRateType>,
    #[validate(range(min = 1, max = 60))]
    pub tenure: Option<i32>,
    pub repayment_frequency: Option<RepaymentFrequency>,
    pub loan_officer_id: Option<Uuid>,
}

/// Query parameters for listing loans
#[derive(Debug, Deserialize, Default)]
pub struct ListLoansQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<LoanStatus>,
    pub purpose: Option<LoanPurpose>,
    pub customer_id: Option<Uuid>,
    pub loan_officer_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
}

/// Paginated loan listing
#[derive(Debug, Serialize)]
pub struct LoanPage {
    pub data: Vec<Loan>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// Appraisal fields; used for both creation and partial revision
#[derive(Debug, Deserialize, Validate, Clone, Default)]
pub struct AppraisalRequest {
    pub site_visit_date: Option<NaiveDate>,
    pub site_visit_notes: Option<String>,
    pub site_visit_photos: Option<Vec<String>>,
    #[validate(custom = "validate_non_negative")]
    pub monthly_income: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub monthly_expenses: Option<Decimal>,
    pub net_cash_flow: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub debt_service_ratio: Option<Decimal>,
    #[validate(range(min = 0, max = 1000))]
    pub credit_score: Option<i32>,
    pub scoring_notes: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub recommended_amount: Option<Decimal>,
    #[validate(range(min = 1, max = 60))]
    pub recommended_tenure: Option<i32>,
    pub appraisal_notes: Option<String>,
    pub recommendation: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct ApprovalDecisionRequest {
    pub level: ApprovalLevel,
    pub decision: ApprovalDecisionType,
    #[validate(custom = "validate_positive")]
    pub approved_amount: Option<Decimal>,
    pub conditions: Option<Vec<String>>,
    pub notes: Option<String>,
    pub minutes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateDisbursementRequest {
    #[validate(custom = "validate_positive")]
    pub amount: Decimal,
    pub method: DisbursementMethod,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub bank_name: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerifyDisbursementRequest {
    pub verified: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompleteDisbursementRequest {
    pub confirm: bool,
    pub reference_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CloseLoanRequest {
    #[validate(length(min = 1, max = 40))]
    pub final_rating: String,
    pub closure_notes: Option<String>,
    pub closure_checklist: Option<Vec<String>>,
}

/// Response to a successful closure
#[derive(Debug, Serialize)]
pub struct LoanClosure {
    pub loan: Loan,
    pub final_rating: String,
    pub closure_notes: Option<String>,
    pub closure_checklist: Vec<String>,
}

/// Result of completing a disbursement
#[derive(Debug, Serialize)]
pub struct DisbursementCompletion {
    pub loan: Loan,
    pub disbursement: Disbursement,
    pub schedule: Vec<RepaymentInstallment>,
}
