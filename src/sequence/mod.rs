//! Sequence and identifier generation
//!
//! Counters live in `id_sequences`, keyed by scope, branch code and year. The
//! increment is a single upsert, so two transactions asking for the same key
//! serialize on the row lock and never receive the same value.

use sqlx::PgConnection;

use crate::error::{DomainError, DomainResult};

/// Year key for counters that never reset
const LIFETIME: i32 = 0;

/// What a counter numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceScope {
    Loan,
    Customer,
    Account,
}

impl SequenceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceScope::Loan => "LOAN",
            SequenceScope::Customer => "CUSTOMER",
            SequenceScope::Account => "ACCOUNT",
        }
    }

    /// Account numbers run for the branch's lifetime; the others restart yearly
    fn key_year(&self, year: i32) -> i32 {
        match self {
            SequenceScope::Account => LIFETIME,
            _ => year,
        }
    }
}

/// Increment and return the counter for `(scope, branch_code, year)`.
/// Must run inside the caller's transaction.
pub async fn next_value(
    conn: &mut PgConnection,
    scope: SequenceScope,
    branch_code: &str,
    year: i32,
) -> DomainResult<i64> {
    let (value,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO id_sequences (scope, branch_code, year, current_value)
        VALUES ($1, $2, $3, 1)
        ON CONFLICT (scope, branch_code, year)
        DO UPDATE SET current_value = id_sequences.current_value + 1
        RETURNING current_value
        "#,
    )
    .bind(scope.as_str())
    .bind(branch_code)
    .bind(scope.key_year(year))
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(scope = scope.as_str(), branch_code, value, "Sequence advanced");

    Ok(value)
}

fn two_digit_year(year: i32) -> i32 {
    year.rem_euclid(100)
}

pub fn format_loan_id(branch_code: &str, year: i32, value: i64) -> String {
    format!("LN-{}-{:02}-{:05}", branch_code, two_digit_year(year), value)
}

pub fn format_customer_id(branch_code: &str, year: i32, value: i64) -> String {
    format!("{}-{:02}-{:05}", branch_code, two_digit_year(year), value)
}

pub fn format_account_number(branch_code: &str, value: i64) -> String {
    format!("MF-{}-{:08}", branch_code, value)
}

/// Next loan identifier for a branch, e.g. `LN-HQ1-24-00042`
pub async fn next_loan_id(conn: &mut PgConnection, branch_code: &str, year: i32) -> DomainResult<String> {
    let value = next_value(conn, SequenceScope::Loan, branch_code, year).await?;
    Ok(format_loan_id(branch_code, year, value))
}

/// Next customer identifier for a branch, e.g. `HQ1-24-00042`
pub async fn next_customer_id(
    conn: &mut PgConnection,
    branch_code: &str,
    year: i32,
) -> DomainResult<String> {
    let value = next_value(conn, SequenceScope::Customer, branch_code, year).await?;
    Ok(format_customer_id(branch_code, year, value))
}

/// Next account number for a branch, e.g. `MF-HQ1-00000042`
pub async fn next_account_number(conn: &mut PgConnection, branch_code: &str) -> DomainResult<String> {
    let value = next_value(conn, SequenceScope::Account, branch_code, LIFETIME).await?;
    Ok(format_account_number(branch_code, value))
}

/// `MF-<branch>-<8 digits>` where the branch code is at least three
/// uppercase letters or digits
pub fn validate_account_number(account_number: &str) -> bool {
    let mut parts = account_number.split('-');
    let (Some(prefix), Some(branch), Some(serial), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    prefix == "MF"
        && branch.len() >= 3
        && branch
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && serial.len() == 8
        && serial.chars().all(|c| c.is_ascii_digit())
}

/// Branch code embedded in a well-formed account number
pub fn extract_branch_code(account_number: &str) -> DomainResult<&str> {
    if !validate_account_number(account_number) {
        return Err(DomainError::validation(format!(
            "malformed account number: {}",
            account_number
        )));
    }
    account_number
        .split('-')
        .nth(1)
        .ok_or_else(|| DomainError::validation("account number has no branch code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats() {
        assert_eq!(format_loan_id("HQ1", 2024, 42), "LN-HQ1-24-00042");
        assert_eq!(format_customer_id("NRB", 2031, 7), "NRB-31-00007");
        assert_eq!(format_account_number("NRB", 123), "MF-NRB-00000123");
        assert_eq!(format_loan_id("HQ1", 2000, 1), "LN-HQ1-00-00001");
    }

    #[test]
    fn test_account_counter_is_lifetime_scoped() {
        assert_eq!(SequenceScope::Account.key_year(2024), LIFETIME);
        assert_eq!(SequenceScope::Loan.key_year(2024), 2024);
    }

    #[test]
    fn test_validate_account_number() {
        assert!(validate_account_number("MF-NRB-00000123"));
        assert!(validate_account_number("MF-HQ01-99999999"));
        assert!(!validate_account_number("MF-NB-00000123"));
        assert!(!validate_account_number("MF-nrb-00000123"));
        assert!(!validate_account_number("MF-NRB-0000123"));
        assert!(!validate_account_number("XX-NRB-00000123"));
        assert!(!validate_account_number("MF-NRB-00000123-1"));
    }

    #[test]
    fn test_extract_branch_code() {
        assert_eq!(extract_branch_code("MF-NRB-00000123").unwrap(), "NRB");
        assert!(extract_branch_code("garbage").is_err());
    }

    #[test]
    fn test_generated_numbers_validate() {
        assert!(validate_account_number(&format_account_number("KSM", 1)));
    }
}
