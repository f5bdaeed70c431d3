//! Disbursement sub-process: PENDING -> PROCESSING -> COMPLETED
//!
//! Verification is a one-way gate recorded by the verifier stamp; a
//! disbursement cannot be verified twice or un-verified.

use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{CreateDisbursementRequest, Disbursement, DisbursementStatus};

/// Reference assigned at completion when the caller supplied none
pub fn generate_reference(loan_code: &str, now: DateTime<Utc>) -> String {
    format!("DSB-{}-{}", loan_code, now.format("%Y%m%d%H%M%S"))
}

/// Check a requested amount against the approved ceiling
pub fn check_amount(amount: Decimal, approved: Option<Decimal>) -> Result<(), String> {
    if amount <= Decimal::ZERO {
        return Err("disbursement amount must be positive".to_string());
    }
    match approved {
        Some(ceiling) if amount > ceiling => Err(format!(
            "disbursement amount {} exceeds approved amount {}",
            amount, ceiling
        )),
        Some(_) => Ok(()),
        None => Err("loan has no approved amount".to_string()),
    }
}

pub fn is_verified(disbursement: &Disbursement) -> bool {
    disbursement.verified_by.is_some()
}

pub fn open(loan_id: Uuid, request: &CreateDisbursementRequest, now: DateTime<Utc>) -> Disbursement {
    Disbursement {
        id: Uuid::new_v4(),
        loan_id,
        amount: request.amount,
        method: request.method,
        account_number: request.account_number.clone(),
        account_name: request.account_name.clone(),
        bank_name: request.bank_name.clone(),
        reference_number: request.reference_number.clone(),
        notes: request.notes.clone(),
        status: DisbursementStatus::Pending,
        verified_by: None,
        verified_at: None,
        disbursed_by: None,
        disbursed_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Stamp the verifier; the error is the reason verification is refused
pub fn verify(
    current: &Disbursement,
    verifier: Uuid,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Disbursement, &'static str> {
    if current.status == DisbursementStatus::Completed {
        return Err("disbursement is already completed");
    }
    if is_verified(current) {
        return Err("disbursement is already verified");
    }

    let mut next = current.clone();
    next.status = DisbursementStatus::Processing;
    next.verified_by = Some(verifier);
    next.verified_at = Some(now);
    if let Some(notes) = notes {
        next.notes = Some(notes.to_string());
    }
    next.updated_at = now;
    Ok(next)
}

/// Stamp the disburser and reference; requires prior verification
pub fn complete(
    current: &Disbursement,
    disburser: Uuid,
    reference: Option<&str>,
    loan_code: &str,
    now: DateTime<Utc>,
) -> Result<Disbursement, &'static str> {
    if current.status == DisbursementStatus::Completed {
        return Err("disbursement is already completed");
    }
    if !is_verified(current) {
        return Err("disbursement must be verified before completion");
    }

    let mut next = current.clone();
    next.status = DisbursementStatus::Completed;
    next.disbursed_by = Some(disburser);
    next.disbursed_at = Some(now);
    next.reference_number = reference
        .map(str::to_string)
        .or_else(|| current.reference_number.clone())
        .or_else(|| Some(generate_reference(loan_code, now)));
    next.updated_at = now;
    Ok(next)
}
