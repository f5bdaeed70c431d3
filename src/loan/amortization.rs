//! Amortization engine
//!
//! Builds a fixed-installment (annuity) repayment plan from the approved
//! principal. All arithmetic is decimal and amounts are rounded to cents with
//! half-away-from-zero. Every installment but the last totals exactly A. The
//! last one pays off the remaining balance plus its own interest, so its total
//! may differ from A by the rounding residual.

use chrono::{Duration, Months, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{RepaymentFrequency, RepaymentInstallment};
use crate::error::{DomainError, DomainResult};

const MONEY_SCALE: u32 = 2;

/// Inputs to schedule generation
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleTerms {
    pub principal: Decimal,
    /// Annual rate in percent, e.g. `12` for 12%
    pub annual_rate: Decimal,
    /// Tenure in months
    pub tenure: i32,
    pub frequency: RepaymentFrequency,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedInstallment {
    pub number: i32,
    pub due_date: NaiveDate,
    pub principal: Decimal,
    pub interest: Decimal,
    pub total: Decimal,
    /// Principal still owed after this installment
    pub balance_after: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmortizationPlan {
    pub installment_amount: Decimal,
    pub periodic_rate: Decimal,
    pub installments: Vec<PlannedInstallment>,
}

impl AmortizationPlan {
    pub fn total_principal(&self) -> Decimal {
        self.installments.iter().map(|i| i.principal).sum()
    }

    pub fn total_payable(&self) -> Decimal {
        self.installments.iter().map(|i| i.total).sum()
    }

    /// Turn the plan into schedule rows owned by `loan_id`
    pub fn into_rows(self, loan_id: Uuid, now: DateTime<Utc>) -> Vec<RepaymentInstallment> {
        self.installments
            .into_iter()
            .map(|i| RepaymentInstallment {
                id: Uuid::new_v4(),
                loan_id,
                installment_number: i.number,
                due_date: i.due_date,
                principal_amount: i.principal,
                interest_amount: i.interest,
                total_amount: i.total,
                // Outstanding amounts mirror the installment itself
                outstanding_principal: i.principal,
                outstanding_interest: i.interest,
                outstanding_total: i.total,
                created_at: now,
            })
            .collect()
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn periods_per_year(frequency: RepaymentFrequency) -> u32 {
    match frequency {
        RepaymentFrequency::Weekly => 52,
        RepaymentFrequency::Biweekly => 26,
        RepaymentFrequency::Monthly => 12,
        RepaymentFrequency::Quarterly => 4,
    }
}

/// Number of installments for a tenure expressed in months
pub fn installment_count(frequency: RepaymentFrequency, tenure: i32) -> DomainResult<u32> {
    let months = u32::try_from(tenure)
        .ok()
        .filter(|m| *m > 0)
        .ok_or_else(|| DomainError::validation("tenure must be at least one month"))?;

    match frequency {
        RepaymentFrequency::Monthly => Ok(months),
        RepaymentFrequency::Weekly => Ok(months * 4),
        RepaymentFrequency::Biweekly => Ok(months * 2),
        RepaymentFrequency::Quarterly if months % 3 == 0 => Ok(months / 3),
        RepaymentFrequency::Quarterly => Err(DomainError::validation(format!(
            "quarterly repayment needs a tenure divisible by 3 months, got {}",
            months
        ))),
    }
}

/// Periodic rate as a fraction, from an annual percentage
pub fn periodic_rate(annual_rate: Decimal, frequency: RepaymentFrequency) -> Decimal {
    annual_rate / dec!(100) / Decimal::from(periods_per_year(frequency))
}

/// Fixed installment `A = P·r·(1+r)^n / ((1+r)^n − 1)`, or `P / n` at zero rate
pub fn installment_amount(principal: Decimal, rate: Decimal, count: u32) -> DomainResult<Decimal> {
    if count == 0 {
        return Err(DomainError::validation("installment count must be positive"));
    }
    if rate.is_zero() {
        return Ok(round_money(principal / Decimal::from(count)));
    }

    let overflow = || DomainError::validation("loan terms overflow decimal arithmetic");
    let growth = (Decimal::ONE + rate)
        .checked_powu(u64::from(count))
        .ok_or_else(overflow)?;
    let numerator = principal
        .checked_mul(rate)
        .and_then(|v| v.checked_mul(growth))
        .ok_or_else(overflow)?;
    let amount = numerator
        .checked_div(growth - Decimal::ONE)
        .ok_or_else(overflow)?;

    Ok(round_money(amount))
}

/// Due date of installment `number` (1-based). Month arithmetic clamps to the
/// end of shorter months and is always computed from the start date.
pub fn due_date(
    start: NaiveDate,
    frequency: RepaymentFrequency,
    number: u32,
) -> DomainResult<NaiveDate> {
    let due = match frequency {
        RepaymentFrequency::Monthly => start.checked_add_months(Months::new(number)),
        RepaymentFrequency::Quarterly => start.checked_add_months(Months::new(number * 3)),
        RepaymentFrequency::Weekly => start.checked_add_signed(Duration::days(7 * i64::from(number))),
        RepaymentFrequency::Biweekly => {
            start.checked_add_signed(Duration::days(14 * i64::from(number)))
        }
    };

    due.ok_or_else(|| DomainError::validation("due date is out of range"))
}

/// Lay out `count` rows at installment `amount`. Returns `None` when a row
/// before the last would carry no principal or use up the balance.
fn lay_out(
    terms: &ScheduleTerms,
    rate: Decimal,
    count: u32,
    amount: Decimal,
) -> DomainResult<Option<Vec<PlannedInstallment>>> {
    let mut balance = terms.principal;
    let mut installments = Vec::with_capacity(count as usize);

    for number in 1..=count {
        let interest = round_money(balance * rate);
        let principal = if number == count {
            balance
        } else {
            let principal = (amount - interest).max(Decimal::ZERO);
            if principal.is_zero() || principal >= balance {
                return Ok(None);
            }
            principal
        };

        balance -= principal;
        installments.push(PlannedInstallment {
            number: number as i32,
            due_date: due_date(terms.start_date, terms.frequency, number)?,
            principal,
            interest,
            total: principal + interest,
            balance_after: balance,
        });
    }

    Ok(Some(installments))
}

/// Generate the full plan for `terms`.
///
/// When cent rounding of A would pay the loan off early (small principals
/// spread over many periods), A is lowered a cent at a time until every
/// installment before the last still carries principal.
pub fn build_plan(terms: &ScheduleTerms) -> DomainResult<AmortizationPlan> {
    if terms.principal <= Decimal::ZERO {
        return Err(DomainError::validation("principal must be positive"));
    }
    if terms.annual_rate.is_sign_negative() && !terms.annual_rate.is_zero() {
        return Err(DomainError::validation("interest rate cannot be negative"));
    }

    let count = installment_count(terms.frequency, terms.tenure)?;
    let rate = periodic_rate(terms.annual_rate, terms.frequency);
    let mut amount = installment_amount(terms.principal, rate, count)?;
    let cent = Decimal::new(1, MONEY_SCALE);

    loop {
        if let Some(installments) = lay_out(terms, rate, count, amount)? {
            return Ok(AmortizationPlan {
                installment_amount: amount,
                periodic_rate: rate,
                installments,
            });
        }
        if amount <= cent {
            return Err(DomainError::validation(format!(
                "principal {} is too small to spread over {} installments",
                terms.principal, count
            )));
        }
        amount -= cent;
    }
}
