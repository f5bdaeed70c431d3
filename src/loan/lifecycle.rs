//! Loan state machine
//!
//! [`LoanAction::allowed_from`] is the transition table. Every transition on
//! [`LoanAggregate`] validates first and mutates only once nothing can fail,
//! so a rejected action leaves the aggregate exactly as it was.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use sqlx::types::chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use super::amortization::{self, ScheduleTerms};
use super::appraisal;
use super::approval;
use super::disbursement;
use super::model::*;
use crate::customer::KycStatus;
use crate::eligibility;
use crate::error::{DomainError, DomainResult};

const MIN_REQUESTED_AMOUNT: Decimal = dec!(100);
const MAX_INTEREST_RATE: Decimal = dec!(100);
const MAX_TENURE_MONTHS: i32 = 60;

/// Intents a caller can apply to an existing loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanAction {
    Update,
    Submit,
    CreateAppraisal,
    UpdateAppraisal,
    CompleteAppraisal,
    RecordDecision,
    CreateDisbursement,
    VerifyDisbursement,
    CompleteDisbursement,
    Activate,
    Close,
}

impl LoanAction {
    pub const ALL: [LoanAction; 11] = [
        LoanAction::Update,
        LoanAction::Submit,
        LoanAction::CreateAppraisal,
        LoanAction::UpdateAppraisal,
        LoanAction::CompleteAppraisal,
        LoanAction::RecordDecision,
        LoanAction::CreateDisbursement,
        LoanAction::VerifyDisbursement,
        LoanAction::CompleteDisbursement,
        LoanAction::Activate,
        LoanAction::Close,
    ];

    /// Statuses from which this action may be attempted
    pub fn allowed_from(self) -> &'static [LoanStatus] {
        use LoanStatus::*;
        match self {
            LoanAction::Update | LoanAction::Submit => &[Draft],
            LoanAction::CreateAppraisal => &[ApplicationSubmitted],
            LoanAction::UpdateAppraisal
            | LoanAction::CompleteAppraisal
            | LoanAction::RecordDecision => &[UnderAppraisal, PendingApproval],
            LoanAction::CreateDisbursement
            | LoanAction::VerifyDisbursement
            | LoanAction::CompleteDisbursement => &[Approved, ApprovedWithConditions],
            LoanAction::Activate => &[Disbursed],
            LoanAction::Close => &[Disbursed, Active],
        }
    }

    pub fn is_allowed_from(self, status: LoanStatus) -> bool {
        self.allowed_from().contains(&status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanAction::Update => "update",
            LoanAction::Submit => "submit",
            LoanAction::CreateAppraisal => "create appraisal for",
            LoanAction::UpdateAppraisal => "update appraisal for",
            LoanAction::CompleteAppraisal => "complete appraisal for",
            LoanAction::RecordDecision => "record approval decision for",
            LoanAction::CreateDisbursement => "create disbursement for",
            LoanAction::VerifyDisbursement => "verify disbursement for",
            LoanAction::CompleteDisbursement => "complete disbursement for",
            LoanAction::Activate => "activate",
            LoanAction::Close => "close",
        }
    }
}

impl fmt::Display for LoanAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject `action` unless the table allows it from `status`.
///
/// Editing is reported as `Forbidden` since the loan exists but is no longer
/// a draft; every other mismatch is an `InvalidTransition`.
pub fn ensure_allowed(action: LoanAction, status: LoanStatus) -> DomainResult<()> {
    if action.is_allowed_from(status) {
        return Ok(());
    }
    match action {
        LoanAction::Update => Err(DomainError::forbidden(
            action,
            status,
            "only DRAFT loans can be edited",
        )),
        _ => Err(DomainError::InvalidTransition { action, status }),
    }
}

/// Cross-field checks on loan terms
pub fn validate_terms(
    requested_amount: Decimal,
    interest_rate: Decimal,
    tenure: i32,
    frequency: RepaymentFrequency,
) -> DomainResult<()> {
    if requested_amount < MIN_REQUESTED_AMOUNT {
        return Err(DomainError::validation(format!(
            "requested amount must be at least {}",
            MIN_REQUESTED_AMOUNT
        )));
    }
    if interest_rate < Decimal::ZERO || interest_rate > MAX_INTEREST_RATE {
        return Err(DomainError::validation(
            "interest rate must be between 0 and 100 percent",
        ));
    }
    if !(1..=MAX_TENURE_MONTHS).contains(&tenure) {
        return Err(DomainError::validation(format!(
            "tenure must be between 1 and {} months",
            MAX_TENURE_MONTHS
        )));
    }
    amortization::installment_count(frequency, tenure).map(|_| ())
}

impl LoanAggregate {
    /// Open a DRAFT loan for a customer whose KYC is complete
    pub fn draft(
        request: &CreateLoanRequest,
        loan_code: String,
        customer_kyc: Option<KycStatus>,
        created_by: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        eligibility::require_complete_kyc(customer_kyc)?;
        validate_terms(
            request.requested_amount,
            request.interest_rate,
            request.tenure,
            request.repayment_frequency,
        )?;

        Ok(LoanAggregate::new(Loan {
            id: Uuid::new_v4(),
            loan_id: loan_code,
            customer_id: request.customer_id,
            loan_officer_id: request.loan_officer_id,
            branch_id: request.branch_id,
            product_name: request.product_name.clone(),
            purpose: request.purpose,
            requested_amount: request.requested_amount,
            approved_amount: None,
            interest_rate: request.interest_rate,
            interest_rate_type: request.interest_rate_type,
            tenure: request.tenure,
            repayment_frequency: request.repayment_frequency,
            status: LoanStatus::Draft,
            approval_date: None,
            disbursement_date: None,
            closed_date: None,
            final_rating: None,
            closure_notes: None,
            created_by,
            created_at: now,
            updated_at: now,
        }))
    }

    /// Edit the terms of a DRAFT loan
    pub fn update_draft(&mut self, request: &UpdateLoanRequest, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_allowed(LoanAction::Update, self.loan.status)?;

        let mut next = self.loan.clone();
        if let Some(product_name) = &request.product_name {
            next.product_name = product_name.clone();
        }
        if let Some(purpose) = request.purpose {
            next.purpose = purpose;
        }
        if let Some(amount) = request.requested_amount {
            next.requested_amount = amount;
        }
        if let Some(rate) = request.interest_rate {
            next.interest_rate = rate;
        }
        if let Some(rate_type) = request.interest_rate_type {
            next.interest_rate_type = rate_type;
        }
        if let Some(tenure) = request.tenure {
            next.tenure = tenure;
        }
        if let Some(frequency) = request.repayment_frequency {
            next.repayment_frequency = frequency;
        }
        if let Some(officer) = request.loan_officer_id {
            next.loan_officer_id = officer;
        }
        validate_terms(
            next.requested_amount,
            next.interest_rate,
            next.tenure,
            next.repayment_frequency,
        )?;

        next.updated_at = now;
        self.loan = next;
        Ok(())
    }

    pub fn submit(&mut self, customer_kyc: Option<KycStatus>, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_allowed(LoanAction::Submit, self.loan.status)?;
        eligibility::require_complete_kyc(customer_kyc)?;

        self.set_status(LoanStatus::ApplicationSubmitted, now);
        Ok(())
    }

    /// Start the appraisal. Reads the appraisal slice.
    pub fn open_appraisal(
        &mut self,
        input: &AppraisalRequest,
        appraiser: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<&Appraisal> {
        if self.appraisal.is_some() {
            return Err(DomainError::DuplicateResource(format!(
                "appraisal for loan {}",
                self.loan.loan_id
            )));
        }
        ensure_allowed(LoanAction::CreateAppraisal, self.loan.status)?;

        let created = appraisal::open(self.loan.id, input, appraiser, now);
        self.set_status(LoanStatus::UnderAppraisal, now);
        Ok(&*self.appraisal.insert(created))
    }

    /// Revise an in-progress appraisal. Reads the appraisal slice.
    pub fn revise_appraisal(&mut self, input: &AppraisalRequest, now: DateTime<Utc>) -> DomainResult<&Appraisal> {
        let status = self.loan.status;
        let current = self.require_appraisal()?;
        ensure_allowed(LoanAction::UpdateAppraisal, status)?;
        if current.status == AppraisalStatus::Completed {
            return Err(DomainError::forbidden(
                LoanAction::UpdateAppraisal,
                status,
                "appraisal is already completed",
            ));
        }

        let revised = appraisal::revise(current, input, now);
        Ok(&*self.appraisal.insert(revised))
    }

    /// Freeze the appraisal and move the loan to PENDING_APPROVAL.
    /// Reads the appraisal slice.
    pub fn complete_appraisal(&mut self, appraiser: Uuid, now: DateTime<Utc>) -> DomainResult<&Appraisal> {
        let status = self.loan.status;
        let current = self.require_appraisal()?;
        ensure_allowed(LoanAction::CompleteAppraisal, status)?;
        if current.status == AppraisalStatus::Completed {
            return Err(DomainError::forbidden(
                LoanAction::CompleteAppraisal,
                status,
                "appraisal is already completed",
            ));
        }
        if !appraisal::is_ready_for_completion(current) {
            return Err(DomainError::IncompleteAppraisal);
        }

        let completed = appraisal::complete(current, appraiser, now);
        self.set_status(LoanStatus::PendingApproval, now);
        Ok(&*self.appraisal.insert(completed))
    }

    /// Append a decision and apply it to the loan; the latest decision wins.
    /// Reads the appraisal slice.
    pub fn record_decision(
        &mut self,
        request: &ApprovalDecisionRequest,
        approver: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<&ApprovalDecision> {
        let status = self.loan.status;
        ensure_allowed(LoanAction::RecordDecision, status)?;

        let appraisal_completed = self
            .appraisal
            .as_ref()
            .map(|a| a.status == AppraisalStatus::Completed)
            .unwrap_or(false);
        if !appraisal_completed {
            return Err(DomainError::forbidden(
                LoanAction::RecordDecision,
                status,
                "appraisal must be completed before a decision",
            ));
        }
        if let Some(amount) = request.approved_amount {
            if amount <= Decimal::ZERO {
                return Err(DomainError::validation("approved amount must be positive"));
            }
        }

        let (next_status, approved_amount) =
            approval::outcome(request.decision, self.loan.requested_amount, request.approved_amount);
        let decision = approval::record(self.loan.id, request, approver, now);

        self.loan.approved_amount = approved_amount;
        self.loan.approval_date = Some(now);
        self.set_status(next_status, now);
        self.decisions.push(decision);

        self.decisions
            .last()
            .ok_or_else(|| DomainError::Invariant("decision was not recorded".to_string()))
    }

    /// Open the single disbursement. Reads the decision and disbursement slices.
    pub fn open_disbursement(
        &mut self,
        request: &CreateDisbursementRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<&Disbursement> {
        let status = self.loan.status;
        ensure_allowed(LoanAction::CreateDisbursement, status)?;
        if self.decisions.is_empty() {
            return Err(DomainError::forbidden(
                LoanAction::CreateDisbursement,
                status,
                "loan has no approval decision",
            ));
        }
        if self.disbursement.is_some() {
            return Err(DomainError::DuplicateResource(format!(
                "disbursement for loan {}",
                self.loan.loan_id
            )));
        }
        disbursement::check_amount(request.amount, self.loan.approved_amount)
            .map_err(DomainError::Validation)?;

        let created = disbursement::open(self.loan.id, request, now);
        Ok(&*self.disbursement.insert(created))
    }

    /// Verify the disbursement. Reads the disbursement slice.
    pub fn verify_disbursement(
        &mut self,
        request: &VerifyDisbursementRequest,
        verifier: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<&Disbursement> {
        let status = self.loan.status;
        ensure_allowed(LoanAction::VerifyDisbursement, status)?;
        let current = self.require_disbursement()?;
        if !request.verified {
            return Err(DomainError::validation(
                "verification must be confirmed with verified = true",
            ));
        }

        let verified = disbursement::verify(current, verifier, request.notes.as_deref(), now)
            .map_err(|reason| DomainError::forbidden(LoanAction::VerifyDisbursement, status, reason))?;
        Ok(&*self.disbursement.insert(verified))
    }

    /// Complete the disbursement, mark the loan DISBURSED and materialise the
    /// repayment schedule, all or nothing. Reads the disbursement and
    /// schedule slices.
    pub fn complete_disbursement(
        &mut self,
        request: &CompleteDisbursementRequest,
        disburser: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<&[RepaymentInstallment]> {
        let status = self.loan.status;
        ensure_allowed(LoanAction::CompleteDisbursement, status)?;
        let current = self.require_disbursement()?;
        if !request.confirm {
            return Err(DomainError::forbidden(
                LoanAction::CompleteDisbursement,
                status,
                "completion must be confirmed",
            ));
        }

        let completed = disbursement::complete(
            current,
            disburser,
            request.reference_number.as_deref(),
            &self.loan.loan_id,
            now,
        )
        .map_err(|reason| DomainError::forbidden(LoanAction::CompleteDisbursement, status, reason))?;

        if !self.schedule.is_empty() {
            return Err(DomainError::Invariant(format!(
                "loan {} already has a repayment schedule",
                self.loan.loan_id
            )));
        }
        let principal = self.loan.approved_amount.ok_or_else(|| {
            DomainError::Invariant(format!(
                "loan {} reached disbursement without an approved amount",
                self.loan.loan_id
            ))
        })?;
        let plan = amortization::build_plan(&ScheduleTerms {
            principal,
            annual_rate: self.loan.interest_rate,
            tenure: self.loan.tenure,
            frequency: self.loan.repayment_frequency,
            start_date: now.date_naive(),
        })?;

        self.disbursement = Some(completed);
        self.schedule = plan.into_rows(self.loan.id, now);
        self.loan.disbursement_date = Some(now);
        self.set_status(LoanStatus::Disbursed, now);
        Ok(self.schedule.as_slice())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_allowed(LoanAction::Activate, self.loan.status)?;
        self.set_status(LoanStatus::Active, now);
        Ok(())
    }

    pub fn close(&mut self, request: &CloseLoanRequest, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_allowed(LoanAction::Close, self.loan.status)?;
        let rating = request.final_rating.trim();
        if rating.is_empty() {
            return Err(DomainError::validation("a final rating is required to close a loan"));
        }

        self.loan.final_rating = Some(rating.to_string());
        self.loan.closure_notes = request.closure_notes.clone();
        self.loan.closed_date = Some(now);
        self.set_status(LoanStatus::Closed, now);
        Ok(())
    }

    pub fn latest_decision(&self) -> Option<&ApprovalDecision> {
        approval::latest(&self.decisions)
    }

    /// Check the status-dependent invariants on a fully loaded aggregate
    pub fn check_invariants(&self) -> DomainResult<()> {
        let status = self.loan.status;
        if status.carries_approved_amount() != self.loan.approved_amount.is_some() {
            return Err(DomainError::Invariant(format!(
                "approved amount presence does not match status {}",
                status
            )));
        }
        if status.carries_schedule() == self.schedule.is_empty() {
            return Err(DomainError::Invariant(format!(
                "repayment schedule presence does not match status {}",
                status
            )));
        }
        Ok(())
    }

    fn set_status(&mut self, status: LoanStatus, now: DateTime<Utc>) {
        self.loan.status = status;
        self.loan.updated_at = now;
    }

    fn require_appraisal(&self) -> DomainResult<&Appraisal> {
        self.appraisal
            .as_ref()
            .ok_or_else(|| DomainError::not_found("appraisal", &self.loan.loan_id))
    }

    fn require_disbursement(&self) -> DomainResult<&Disbursement> {
        self.disbursement
            .as_ref()
            .ok_or_else(|| DomainError::not_found("disbursement", &self.loan.loan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_request() -> CreateLoanRequest {
        CreateLoanRequest {
            customer_id: Uuid::new_v4(),
            product_name: "Biashara Boost".to_string(),
            purpose: LoanPurpose::Trade,
            requested_amount: dec!(10000),
            interest_rate: dec!(12),
            interest_rate_type: InterestRateType::ReducingBalance,
            tenure: 12,
            repayment_frequency: RepaymentFrequency::Monthly,
            loan_officer_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
        }
    }

    fn draft() -> LoanAggregate {
        LoanAggregate::draft(
            &create_request(),
            "LN-HQ-24-00001".to_string(),
            Some(KycStatus::Complete),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap()
    }

    fn recommendation() -> AppraisalRequest {
        AppraisalRequest {
            recommendation: Some("APPROVE".to_string()),
            recommended_amount: Some(dec!(9500)),
            ..Default::default()
        }
    }

    fn decision(kind: ApprovalDecisionType, amount: Option<Decimal>) -> ApprovalDecisionRequest {
        ApprovalDecisionRequest {
            level: ApprovalLevel::BranchManager,
            decision: kind,
            approved_amount: amount,
            conditions: None,
            notes: None,
            minutes: None,
        }
    }

    fn pending_approval() -> LoanAggregate {
        let mut loan = draft();
        let staff = Uuid::new_v4();
        loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
        loan.open_appraisal(&recommendation(), staff, Utc::now()).unwrap();
        loan.complete_appraisal(staff, Utc::now()).unwrap();
        loan
    }

    fn disbursement_request(amount: Decimal) -> CreateDisbursementRequest {
        CreateDisbursementRequest {
            amount,
            method: DisbursementMethod::BankTransfer,
            account_number: None,
            account_name: None,
            bank_name: None,
            reference_number: None,
            notes: None,
        }
    }

    #[test]
    fn test_draft_requires_complete_kyc() {
        for kyc in [None, Some(KycStatus::Pending), Some(KycStatus::Incomplete), Some(KycStatus::Expired)] {
            let result = LoanAggregate::draft(
                &create_request(),
                "LN-HQ-24-00001".to_string(),
                kyc,
                Uuid::new_v4(),
                Utc::now(),
            );
            assert!(matches!(result, Err(DomainError::IneligibleCustomer { .. })));
        }
        assert_eq!(draft().status(), LoanStatus::Draft);
    }

    #[test]
    fn test_update_only_in_draft() {
        let mut loan = draft();
        let edit = UpdateLoanRequest {
            requested_amount: Some(dec!(12000)),
            ..Default::default()
        };
        loan.update_draft(&edit, Utc::now()).unwrap();
        assert_eq!(loan.loan.requested_amount, dec!(12000));

        loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
        let err = loan.update_draft(&edit, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
    }

    #[test]
    fn test_update_rejects_invalid_terms_without_change() {
        let mut loan = draft();
        let before = loan.clone();
        let edit = UpdateLoanRequest {
            tenure: Some(10),
            repayment_frequency: Some(RepaymentFrequency::Quarterly),
            ..Default::default()
        };
        assert!(loan.update_draft(&edit, Utc::now()).is_err());
        assert_eq!(loan, before);
    }

    #[test]
    fn test_submit_rechecks_kyc() {
        let mut loan = draft();
        let err = loan.submit(Some(KycStatus::Expired), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::IneligibleCustomer { .. }));
        assert_eq!(loan.status(), LoanStatus::Draft);
    }

    #[test]
    fn test_second_appraisal_is_duplicate() {
        let mut loan = draft();
        let staff = Uuid::new_v4();
        loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
        loan.open_appraisal(&AppraisalRequest::default(), staff, Utc::now()).unwrap();

        let err = loan.open_appraisal(&AppraisalRequest::default(), staff, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateResource(_)));
    }

    #[test]
    fn test_incomplete_appraisal_cannot_complete() {
        let mut loan = draft();
        let staff = Uuid::new_v4();
        loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
        loan.open_appraisal(&AppraisalRequest::default(), staff, Utc::now()).unwrap();

        let before = loan.clone();
        assert_eq!(
            loan.complete_appraisal(staff, Utc::now()).unwrap_err(),
            DomainError::IncompleteAppraisal
        );
        assert_eq!(loan, before);

        loan.revise_appraisal(&recommendation(), Utc::now()).unwrap();
        loan.complete_appraisal(staff, Utc::now()).unwrap();
        assert_eq!(loan.status(), LoanStatus::PendingApproval);
    }

    #[test]
    fn test_completed_appraisal_is_frozen() {
        let mut loan = pending_approval();
        let err = loan.revise_appraisal(&recommendation(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
    }

    #[test]
    fn test_completed_appraisal_cannot_complete_again() {
        let mut loan = pending_approval();
        let before = loan.clone();

        let err = loan.complete_appraisal(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Forbidden {
                action: LoanAction::CompleteAppraisal,
                status: LoanStatus::PendingApproval,
                ..
            }
        ));
        assert_eq!(loan, before);
    }

    #[test]
    fn test_approval_defaults_to_requested_not_recommended() {
        let mut loan = pending_approval();
        loan.record_decision(&decision(ApprovalDecisionType::Approved, None), Uuid::new_v4(), Utc::now())
            .unwrap();

        assert_eq!(loan.status(), LoanStatus::Approved);
        assert_eq!(loan.loan.approved_amount, Some(dec!(10000)));
        assert!(loan.loan.approval_date.is_some());
        assert_eq!(loan.decisions.len(), 1);
    }

    #[test]
    fn test_rejection_clears_amount() {
        let mut loan = pending_approval();
        loan.record_decision(
            &decision(ApprovalDecisionType::Rejected, Some(dec!(5000))),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(loan.status(), LoanStatus::Rejected);
        assert_eq!(loan.loan.approved_amount, None);
        assert!(loan.check_invariants().is_ok());
    }

    #[test]
    fn test_decision_requires_completed_appraisal() {
        let mut loan = draft();
        loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
        loan.open_appraisal(&AppraisalRequest::default(), Uuid::new_v4(), Utc::now()).unwrap();

        let err = loan
            .record_decision(&decision(ApprovalDecisionType::Approved, None), Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
    }

    #[test]
    fn test_disbursement_amount_capped_by_approval() {
        let mut loan = pending_approval();
        loan.record_decision(
            &decision(ApprovalDecisionType::Approved, Some(dec!(9000))),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();

        let err = loan.open_disbursement(&disbursement_request(dec!(9500)), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(loan.disbursement.is_none());

        loan.open_disbursement(&disbursement_request(dec!(9000)), Utc::now()).unwrap();
        let err = loan.open_disbursement(&disbursement_request(dec!(9000)), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateResource(_)));
    }

    #[test]
    fn test_disbursement_flow_builds_schedule() {
        let mut loan = pending_approval();
        let staff = Uuid::new_v4();
        loan.record_decision(&decision(ApprovalDecisionType::Approved, Some(dec!(9500))), staff, Utc::now())
            .unwrap();
        loan.open_disbursement(&disbursement_request(dec!(9500)), Utc::now()).unwrap();

        let complete = CompleteDisbursementRequest {
            confirm: true,
            reference_number: None,
        };
        let before = loan.clone();
        let err = loan.complete_disbursement(&complete, staff, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
        assert_eq!(loan, before);

        let verify = VerifyDisbursementRequest {
            verified: true,
            notes: None,
        };
        loan.verify_disbursement(&verify, staff, Utc::now()).unwrap();
        let schedule = loan.complete_disbursement(&complete, staff, Utc::now()).unwrap();
        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule[0].total_amount, dec!(844.06));

        assert_eq!(loan.status(), LoanStatus::Disbursed);
        assert!(loan.loan.disbursement_date.is_some());
        assert!(loan.check_invariants().is_ok());

        loan.activate(Utc::now()).unwrap();
        let close = CloseLoanRequest {
            final_rating: "EXCELLENT".to_string(),
            closure_notes: Some("repaid early".to_string()),
            closure_checklist: None,
        };
        loan.close(&close, Utc::now()).unwrap();
        assert_eq!(loan.status(), LoanStatus::Closed);
        assert_eq!(loan.loan.final_rating.as_deref(), Some("EXCELLENT"));
        assert!(loan.check_invariants().is_ok());
    }

    #[test]
    fn test_missing_approved_amount_is_an_invariant_failure() {
        let mut loan = pending_approval();
        let staff = Uuid::new_v4();
        loan.record_decision(&decision(ApprovalDecisionType::Approved, None), staff, Utc::now())
            .unwrap();
        loan.open_disbursement(&disbursement_request(dec!(1000)), Utc::now()).unwrap();
        loan.verify_disbursement(&VerifyDisbursementRequest { verified: true, notes: None }, staff, Utc::now())
            .unwrap();

        loan.loan.approved_amount = None;
        let before = loan.clone();
        let err = loan
            .complete_disbursement(&CompleteDisbursementRequest { confirm: true, reference_number: None }, staff, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Invariant(_)));
        assert_eq!(loan, before);
    }

    #[test]
    fn test_close_requires_rating() {
        let mut loan = draft();
        let close = CloseLoanRequest {
            final_rating: "GOOD".to_string(),
            closure_notes: None,
            closure_checklist: None,
        };
        assert!(matches!(
            loan.close(&close, Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_transition_table_shape() {
        assert!(LoanAction::Close.is_allowed_from(LoanStatus::Active));
        assert!(LoanAction::Close.is_allowed_from(LoanStatus::Disbursed));
        assert!(!LoanAction::Close.is_allowed_from(LoanStatus::Overdue));
        for action in LoanAction::ALL {
            assert!(!action.is_allowed_from(LoanStatus::Rejected));
            assert!(!action.is_allowed_from(LoanStatus::Closed));
        }
    }

    #[test]
    fn test_ensure_allowed_error_kinds() {
        assert!(ensure_allowed(LoanAction::Submit, LoanStatus::Draft).is_ok());
        assert!(matches!(
            ensure_allowed(LoanAction::Submit, LoanStatus::Approved),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ensure_allowed(LoanAction::Update, LoanStatus::Approved),
            Err(DomainError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_validate_terms() {
        assert!(validate_terms(dec!(100), dec!(0), 1, RepaymentFrequency::Monthly).is_ok());
        assert!(validate_terms(dec!(99.99), dec!(12), 12, RepaymentFrequency::Monthly).is_err());
        assert!(validate_terms(dec!(1000), dec!(100.5), 12, RepaymentFrequency::Monthly).is_err());
        assert!(validate_terms(dec!(1000), dec!(12), 61, RepaymentFrequency::Monthly).is_err());
        assert!(validate_terms(dec!(1000), dec!(12), 12, RepaymentFrequency::Quarterly).is_ok());
        assert!(validate_terms(dec!(1000), dec!(12), 8, RepaymentFrequency::Quarterly).is_err());
    }
}
