//! Appraisal evaluator

use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{Appraisal, AppraisalRequest, AppraisalStatus};

/// `income − expenses` when both inputs are known, otherwise the caller's figure
pub fn derive_net_cash_flow(
    income: Option<Decimal>,
    expenses: Option<Decimal>,
    supplied: Option<Decimal>,
) -> Option<Decimal> {
    match (income, expenses) {
        (Some(income), Some(expenses)) => Some(income - expenses),
        _ => supplied,
    }
}

/// Start an appraisal from the first set of inputs
pub fn open(loan_id: Uuid, input: &AppraisalRequest, appraiser: Uuid, now: DateTime<Utc>) -> Appraisal {
    Appraisal {
        id: Uuid::new_v4(),
        loan_id,
        status: AppraisalStatus::InProgress,
        site_visit_date: input.site_visit_date,
        site_visit_notes: input.site_visit_notes.clone(),
        site_visit_photos: input.site_visit_photos.clone().unwrap_or_default(),
        monthly_income: input.monthly_income,
        monthly_expenses: input.monthly_expenses,
        net_cash_flow: derive_net_cash_flow(
            input.monthly_income,
            input.monthly_expenses,
            input.net_cash_flow,
        ),
        debt_service_ratio: input.debt_service_ratio,
        credit_score: input.credit_score,
        scoring_notes: input.scoring_notes.clone(),
        recommended_amount: input.recommended_amount,
        recommended_tenure: input.recommended_tenure,
        appraisal_notes: input.appraisal_notes.clone(),
        recommendation: input.recommendation.clone(),
        appraised_by: appraiser,
        appraised_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Apply a partial revision; fields absent from `input` keep their value
pub fn revise(current: &Appraisal, input: &AppraisalRequest, now: DateTime<Utc>) -> Appraisal {
    let mut next = current.clone();

    if input.site_visit_date.is_some() {
        next.site_visit_date = input.site_visit_date;
    }
    if let Some(notes) = &input.site_visit_notes {
        next.site_visit_notes = Some(notes.clone());
    }
    if let Some(photos) = &input.site_visit_photos {
        next.site_visit_photos = photos.clone();
    }
    if input.monthly_income.is_some() {
        next.monthly_income = input.monthly_income;
    }
    if input.monthly_expenses.is_some() {
        next.monthly_expenses = input.monthly_expenses;
    }
    if input.debt_service_ratio.is_some() {
        next.debt_service_ratio = input.debt_service_ratio;
    }
    if input.credit_score.is_some() {
        next.credit_score = input.credit_score;
    }
    if let Some(notes) = &input.scoring_notes {
        next.scoring_notes = Some(notes.clone());
    }
    if input.recommended_amount.is_some() {
        next.recommended_amount = input.recommended_amount;
    }
    if input.recommended_tenure.is_some() {
        next.recommended_tenure = input.recommended_tenure;
    }
    if let Some(notes) = &input.appraisal_notes {
        next.appraisal_notes = Some(notes.clone());
    }
    if let Some(recommendation) = &input.recommendation {
        next.recommendation = Some(recommendation.clone());
    }

    next.net_cash_flow = derive_net_cash_flow(
        next.monthly_income,
        next.monthly_expenses,
        input.net_cash_flow.or(current.net_cash_flow),
    );
    next.updated_at = now;
    next
}

/// An appraisal can be completed once it names a recommendation and a
/// non-zero recommended amount.
pub fn is_ready_for_completion(appraisal: &Appraisal) -> bool {
    let has_recommendation = appraisal
        .recommendation
        .as_deref()
        .map(|r| !r.trim().is_empty())
        .unwrap_or(false);
    let has_amount = appraisal
        .recommended_amount
        .map(|a| !a.is_zero())
        .unwrap_or(false);

    has_recommendation && has_amount
}

/// Freeze the appraisal under `appraiser`
pub fn complete(current: &Appraisal, appraiser: Uuid, now: DateTime<Utc>) -> Appraisal {
    let mut next = current.clone();
    next.status = AppraisalStatus::Completed;
    next.appraised_by = appraiser;
    next.appraised_at = Some(now);
    next.updated_at = now;
    next
}
