//! Approval decision recorder

use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{ApprovalDecision, ApprovalDecisionRequest, ApprovalDecisionType, LoanStatus};

/// Loan status and approved amount that follow from a decision.
///
/// Approvals fall back to the requested amount, never to the appraisal's
/// recommendation. Rejection always clears the amount.
pub fn outcome(
    decision: ApprovalDecisionType,
    requested_amount: Decimal,
    explicit_amount: Option<Decimal>,
) -> (LoanStatus, Option<Decimal>) {
    match decision {
        ApprovalDecisionType::Approved => (
            LoanStatus::Approved,
            Some(explicit_amount.unwrap_or(requested_amount)),
        ),
        ApprovalDecisionType::ApprovedWithConditions => (
            LoanStatus::ApprovedWithConditions,
            Some(explicit_amount.unwrap_or(requested_amount)),
        ),
        ApprovalDecisionType::Rejected => (LoanStatus::Rejected, None),
    }
}

/// Build the immutable audit record for a decision
pub fn record(
    loan_id: Uuid,
    request: &ApprovalDecisionRequest,
    approver: Uuid,
    now: DateTime<Utc>,
) -> ApprovalDecision {
    ApprovalDecision {
        id: Uuid::new_v4(),
        loan_id,
        level: request.level,
        decision: request.decision,
        approved_amount: request.approved_amount,
        conditions: request.conditions.clone().unwrap_or_default(),
        notes: request.notes.clone(),
        minutes: request.minutes.clone(),
        approved_by: approver,
        approved_at: now,
    }
}

/// Most recent decision; decisions are kept in recording order
pub fn latest(decisions: &[ApprovalDecision]) -> Option<&ApprovalDecision> {
    decisions.last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::model::ApprovalLevel;
    use rust_decimal_macros::dec;

    #[test]
    fn test_approval_defaults_to_requested_amount() {
        let (status, amount) = outcome(ApprovalDecisionType::Approved, dec!(10000), None);
        assert_eq!(status, LoanStatus::Approved);
        assert_eq!(amount, Some(dec!(10000)));
    }

    #[test]
    fn test_explicit_amount_wins() {
        let (status, amount) = outcome(
            ApprovalDecisionType::ApprovedWithConditions,
            dec!(10000),
            Some(dec!(8000)),
        );
        assert_eq!(status, LoanStatus::ApprovedWithConditions);
        assert_eq!(amount, Some(dec!(8000)));
    }

    #[test]
    fn test_rejection_ignores_amount() {
        let (status, amount) = outcome(ApprovalDecisionType::Rejected, dec!(10000), Some(dec!(5000)));
        assert_eq!(status, LoanStatus::Rejected);
        assert_eq!(amount, None);
    }

    #[test]
    fn test_record_keeps_request_fields() {
        let request = ApprovalDecisionRequest {
            level: ApprovalLevel::CreditCommittee,
            decision: ApprovalDecisionType::ApprovedWithConditions,
            approved_amount: None,
            conditions: Some(vec!["guarantor required".to_string()]),
            notes: Some("seasonal income".to_string()),
            minutes: None,
        };
        let approver = Uuid::new_v4();
        let decision = record(Uuid::new_v4(), &request, approver, Utc::now());

        assert_eq!(decision.level, ApprovalLevel::CreditCommittee);
        assert_eq!(decision.conditions, vec!["guarantor required".to_string()]);
        assert_eq!(decision.approved_by, approver);
    }
}
