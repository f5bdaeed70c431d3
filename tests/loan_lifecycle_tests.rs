//! Lifecycle tests against the pure loan aggregate

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use microfin_server::customer::KycStatus;
use microfin_server::error::DomainError;
use microfin_server::loan::{
    appraisal, disbursement, AppraisalRequest, ApprovalDecisionRequest, ApprovalDecisionType,
    ApprovalLevel, CloseLoanRequest, CompleteDisbursementRequest, CreateDisbursementRequest,
    CreateLoanRequest, DisbursementMethod, InterestRateType, LoanAction, LoanAggregate,
    LoanPurpose, LoanStatus, RepaymentFrequency, UpdateLoanRequest, VerifyDisbursementRequest,
};

fn create_request() -> CreateLoanRequest {
    CreateLoanRequest {
        customer_id: Uuid::new_v4(),
        product_name: "Kilimo Msimu".to_string(),
        purpose: LoanPurpose::Agriculture,
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
        "LN-NRB-24-00042".to_string(),
        Some(KycStatus::Complete),
        Uuid::new_v4(),
        Utc::now(),
    )
    .unwrap()
}

fn recommendation() -> AppraisalRequest {
    AppraisalRequest {
        monthly_income: Some(dec!(30000)),
        monthly_expenses: Some(dec!(18000)),
        recommendation: Some("APPROVE".to_string()),
        recommended_amount: Some(dec!(9500)),
        recommended_tenure: Some(12),
        ..Default::default()
    }
}

fn approval(amount: Option<Decimal>) -> ApprovalDecisionRequest {
    ApprovalDecisionRequest {
        level: ApprovalLevel::CreditCommittee,
        decision: ApprovalDecisionType::Approved,
        approved_amount: amount,
        conditions: None,
        notes: Some("Good repayment history".to_string()),
        minutes: None,
    }
}

fn disbursement_request(amount: Decimal) -> CreateDisbursementRequest {
    CreateDisbursementRequest {
        amount,
        method: DisbursementMethod::MobileMoney,
        account_number: Some("0712345678".to_string()),
        account_name: Some("Jane Wanjiru".to_string()),
        bank_name: None,
        reference_number: None,
        notes: None,
    }
}

/// A loan forced into `status` with the child records each action checks
/// before the status check.
fn aggregate_in(status: LoanStatus, action: LoanAction) -> LoanAggregate {
    let mut aggregate = draft();
    let now = Utc::now();
    aggregate.loan.status = status;
    if status.carries_approved_amount() {
        aggregate.loan.approved_amount = Some(dec!(10000));
    }
    if action != LoanAction::CreateAppraisal {
        aggregate.appraisal = Some(appraisal::open(
            aggregate.loan.id,
            &recommendation(),
            Uuid::new_v4(),
            now,
        ));
    }
    if matches!(
        action,
        LoanAction::VerifyDisbursement | LoanAction::CompleteDisbursement
    ) {
        aggregate.disbursement = Some(disbursement::open(
            aggregate.loan.id,
            &disbursement_request(dec!(10000)),
            now,
        ));
    }
    aggregate
}

fn perform(aggregate: &mut LoanAggregate, action: LoanAction) -> Result<(), DomainError> {
    let staff = Uuid::new_v4();
    let now = Utc::now();
    match action {
        LoanAction::Update => aggregate.update_draft(
            &UpdateLoanRequest {
                tenure: Some(24),
                ..Default::default()
            },
            now,
        ),
        LoanAction::Submit => aggregate.submit(Some(KycStatus::Complete), now),
        LoanAction::CreateAppraisal => aggregate
            .open_appraisal(&recommendation(), staff, now)
            .map(|_| ()),
        LoanAction::UpdateAppraisal => aggregate
            .revise_appraisal(&recommendation(), now)
            .map(|_| ()),
        LoanAction::CompleteAppraisal => aggregate.complete_appraisal(staff, now).map(|_| ()),
        LoanAction::RecordDecision => aggregate
            .record_decision(&approval(None), staff, now)
            .map(|_| ()),
        LoanAction::CreateDisbursement => aggregate
            .open_disbursement(&disbursement_request(dec!(5000)), now)
            .map(|_| ()),
        LoanAction::VerifyDisbursement => aggregate
            .verify_disbursement(
                &VerifyDisbursementRequest {
                    verified: true,
                    notes: None,
                },
                staff,
                now,
            )
            .map(|_| ()),
        LoanAction::CompleteDisbursement => aggregate
            .complete_disbursement(
                &CompleteDisbursementRequest {
                    confirm: true,
                    reference_number: None,
                },
                staff,
                now,
            )
            .map(|_| ()),
        LoanAction::Activate => aggregate.activate(now),
        LoanAction::Close => aggregate.close(
            &CloseLoanRequest {
                final_rating: "GOOD".to_string(),
                closure_notes: None,
                closure_checklist: None,
            },
            now,
        ),
    }
}

#[test]
fn test_illegal_transitions_are_rejected_without_changes() {
    let mut rejected = 0;

    for status in LoanStatus::ALL {
        for action in LoanAction::ALL {
            if action.is_allowed_from(status) {
                continue;
            }

            let mut aggregate = aggregate_in(status, action);
            let before = aggregate.clone();
            let err = perform(&mut aggregate, action).unwrap_err();

            match (action, &err) {
                (LoanAction::Update, DomainError::Forbidden { action: a, status: s, .. })
                | (_, DomainError::InvalidTransition { action: a, status: s }) => {
                    assert_eq!((*a, *s), (action, status));
                }
                _ => panic!("{} from {}: unexpected error {:?}", action, status, err),
            }
            assert_eq!(aggregate, before, "{} from {} mutated the loan", action, status);
            rejected += 1;
        }
    }

    let allowed: usize = LoanAction::ALL.iter().map(|a| a.allowed_from().len()).sum();
    assert_eq!(rejected + allowed, LoanStatus::ALL.len() * LoanAction::ALL.len());
}

#[test]
fn test_full_origination_to_closure() {
    let staff = Uuid::new_v4();
    let mut loan = draft();

    loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
    assert_eq!(loan.status(), LoanStatus::ApplicationSubmitted);

    loan.open_appraisal(&recommendation(), staff, Utc::now()).unwrap();
    assert_eq!(loan.status(), LoanStatus::UnderAppraisal);

    loan.complete_appraisal(staff, Utc::now()).unwrap();
    assert_eq!(loan.status(), LoanStatus::PendingApproval);

    // No explicit amount: the requested amount is approved, not the recommendation
    loan.record_decision(&approval(None), staff, Utc::now()).unwrap();
    assert_eq!(loan.status(), LoanStatus::Approved);
    assert_eq!(loan.loan.approved_amount, Some(dec!(10000)));
    assert!(loan.loan.approval_date.is_some());

    loan.open_disbursement(&disbursement_request(dec!(10000)), Utc::now())
        .unwrap();
    loan.verify_disbursement(
        &VerifyDisbursementRequest {
            verified: true,
            notes: Some("ID checked at counter".to_string()),
        },
        staff,
        Utc::now(),
    )
    .unwrap();

    let schedule = loan
        .complete_disbursement(
            &CompleteDisbursementRequest {
                confirm: true,
                reference_number: None,
            },
            staff,
            Utc::now(),
        )
        .unwrap()
        .to_vec();

    assert_eq!(loan.status(), LoanStatus::Disbursed);
    assert_eq!(schedule.len(), 12);
    assert_eq!(schedule[0].interest_amount, dec!(100.00));
    assert_eq!(schedule[0].principal_amount, dec!(788.49));
    assert_eq!(
        schedule.iter().map(|i| i.principal_amount).sum::<Decimal>(),
        dec!(10000)
    );
    assert!(schedule
        .windows(2)
        .all(|w| w[0].due_date < w[1].due_date));

    let reference = loan
        .disbursement
        .as_ref()
        .and_then(|d| d.reference_number.clone())
        .unwrap();
    assert!(reference.starts_with("DSB-LN-NRB-24-00042-"));
    loan.check_invariants().unwrap();

    loan.activate(Utc::now()).unwrap();
    loan.close(
        &CloseLoanRequest {
            final_rating: "EXCELLENT".to_string(),
            closure_notes: Some("Repaid early".to_string()),
            closure_checklist: None,
        },
        Utc::now(),
    )
    .unwrap();

    assert_eq!(loan.status(), LoanStatus::Closed);
    assert_eq!(loan.loan.final_rating.as_deref(), Some("EXCELLENT"));
    loan.check_invariants().unwrap();
}

#[test]
fn test_conditional_approval_caps_disbursement() {
    let staff = Uuid::new_v4();
    let mut loan = draft();
    loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
    loan.open_appraisal(&recommendation(), staff, Utc::now()).unwrap();
    loan.complete_appraisal(staff, Utc::now()).unwrap();

    let conditional = ApprovalDecisionRequest {
        decision: ApprovalDecisionType::ApprovedWithConditions,
        approved_amount: Some(dec!(8000)),
        conditions: Some(vec!["Guarantor to co-sign".to_string()]),
        ..approval(None)
    };
    loan.record_decision(&conditional, staff, Utc::now()).unwrap();
    assert_eq!(loan.status(), LoanStatus::ApprovedWithConditions);
    assert_eq!(loan.loan.approved_amount, Some(dec!(8000)));
    assert_eq!(
        loan.latest_decision().map(|d| d.conditions.clone()),
        Some(vec!["Guarantor to co-sign".to_string()])
    );

    // A second decision is not accepted once the loan has left appraisal
    let before = loan.clone();
    let err = loan
        .record_decision(&approval(None), staff, Utc::now())
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));
    assert_eq!(loan, before);

    let err = loan
        .open_disbursement(&disbursement_request(dec!(8000.01)), Utc::now())
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
    assert_eq!(loan, before);

    loan.open_disbursement(&disbursement_request(dec!(8000)), Utc::now())
        .unwrap();
    let err = loan
        .open_disbursement(&disbursement_request(dec!(100)), Utc::now())
        .unwrap_err();
    assert!(matches!(err, DomainError::DuplicateResource(_)));
}

#[test]
fn test_rejection_is_terminal() {
    let staff = Uuid::new_v4();
    let mut loan = draft();
    loan.submit(Some(KycStatus::Complete), Utc::now()).unwrap();
    loan.open_appraisal(&recommendation(), staff, Utc::now()).unwrap();
    loan.complete_appraisal(staff, Utc::now()).unwrap();

    let rejection = ApprovalDecisionRequest {
        decision: ApprovalDecisionType::Rejected,
        approved_amount: Some(dec!(5000)),
        ..approval(None)
    };
    loan.record_decision(&rejection, staff, Utc::now()).unwrap();
    assert_eq!(loan.status(), LoanStatus::Rejected);
    assert_eq!(loan.loan.approved_amount, None);
    loan.check_invariants().unwrap();

    assert!(LoanAction::ALL
        .iter()
        .all(|action| !action.is_allowed_from(LoanStatus::Rejected)));
}

#[test]
fn test_draft_rejects_incomplete_kyc() {
    for kyc in [None, Some(KycStatus::Pending), Some(KycStatus::Expired)] {
        let err = LoanAggregate::draft(
            &create_request(),
            "LN-NRB-24-00043".to_string(),
            kyc,
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::IneligibleCustomer { .. }));
    }
}
