//! Aggregate-slice loaders and writers for the loan tables
//!
//! Every function takes the caller's connection so a transition can compose
//! them inside one transaction. Status writes are compare-and-swap on the
//! status the transition was validated against.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::model::*;
use crate::db;
use crate::error::{DomainError, DomainResult};

/// Load the loan row and hold its lock until the transaction ends
pub async fn lock_loan(conn: &mut PgConnection, id: Uuid) -> DomainResult<Loan> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DomainError::not_found("loan", id))
}

pub async fn find_loan(conn: &mut PgConnection, id: Uuid) -> DomainResult<Loan> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DomainError::not_found("loan", id))
}

pub async fn load_appraisal(conn: &mut PgConnection, loan_id: Uuid) -> DomainResult<Option<Appraisal>> {
    let appraisal = sqlx::query_as::<_, Appraisal>("SELECT * FROM appraisals WHERE loan_id = $1")
        .bind(loan_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(appraisal)
}

/// Decisions in recording order
pub async fn load_decisions(conn: &mut PgConnection, loan_id: Uuid) -> DomainResult<Vec<ApprovalDecision>> {
    let decisions = sqlx::query_as::<_, ApprovalDecision>(
        "SELECT * FROM approval_decisions WHERE loan_id = $1 ORDER BY approved_at, id",
    )
    .bind(loan_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(decisions)
}

pub async fn load_disbursement(conn: &mut PgConnection, loan_id: Uuid) -> DomainResult<Option<Disbursement>> {
    let disbursement = sqlx::query_as::<_, Disbursement>("SELECT * FROM disbursements WHERE loan_id = $1")
        .bind(loan_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(disbursement)
}

pub async fn load_schedule(conn: &mut PgConnection, loan_id: Uuid) -> DomainResult<Vec<RepaymentInstallment>> {
    let schedule = sqlx::query_as::<_, RepaymentInstallment>(
        "SELECT * FROM repayment_schedules WHERE loan_id = $1 ORDER BY installment_number",
    )
    .bind(loan_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(schedule)
}

/// Every slice, for read-only views
pub async fn load_full(conn: &mut PgConnection, id: Uuid) -> DomainResult<LoanAggregate> {
    let loan = find_loan(conn, id).await?;
    let appraisal = load_appraisal(conn, id).await?;
    let decisions = load_decisions(conn, id).await?;
    let disbursement = load_disbursement(conn, id).await?;
    let schedule = load_schedule(conn, id).await?;

    Ok(LoanAggregate::new(loan)
        .with_appraisal(appraisal)
        .with_decisions(decisions)
        .with_disbursement(disbursement)
        .with_schedule(schedule))
}

/// Whether a staff member with this id is known
pub async fn user_exists(conn: &mut PgConnection, user_id: Uuid) -> DomainResult<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.is_some())
}

pub async fn insert_loan(conn: &mut PgConnection, loan: &Loan) -> DomainResult<Loan> {
    let inserted = sqlx::query_as::<_, Loan>(
        r#"
        INSERT INTO loans (
            id, loan_id, customer_id, loan_officer_id, branch_id, product_name, purpose,
            requested_amount, approved_amount, interest_rate, interest_rate_type, tenure,
            repayment_frequency, status, created_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
        "#,
    )
    .bind(loan.id)
    .bind(&loan.loan_id)
    .bind(loan.customer_id)
    .bind(loan.loan_officer_id)
    .bind(loan.branch_id)
    .bind(&loan.product_name)
    .bind(loan.purpose)
    .bind(loan.requested_amount)
    .bind(loan.approved_amount)
    .bind(loan.interest_rate)
    .bind(loan.interest_rate_type)
    .bind(loan.tenure)
    .bind(loan.repayment_frequency)
    .bind(loan.status)
    .bind(loan.created_by)
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Persist editable terms of a DRAFT loan
pub async fn update_terms(conn: &mut PgConnection, loan: &Loan) -> DomainResult<Loan> {
    sqlx::query_as::<_, Loan>(
        r#"
        UPDATE loans
        SET product_name = $1, purpose = $2, requested_amount = $3, interest_rate = $4,
            interest_rate_type = $5, tenure = $6, repayment_frequency = $7,
            loan_officer_id = $8, updated_at = $9
        WHERE id = $10 AND status = $11
        RETURNING *
        "#,
    )
    .bind(&loan.product_name)
    .bind(loan.purpose)
    .bind(loan.requested_amount)
    .bind(loan.interest_rate)
    .bind(loan.interest_rate_type)
    .bind(loan.tenure)
    .bind(loan.repayment_frequency)
    .bind(loan.loan_officer_id)
    .bind(loan.updated_at)
    .bind(loan.id)
    .bind(LoanStatus::Draft)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DomainError::Conflict(format!("loan {} is no longer a draft", loan.loan_id)))
}

/// Write the lifecycle fields if the stored status is still `expected`
pub async fn update_state(conn: &mut PgConnection, loan: &Loan, expected: LoanStatus) -> DomainResult<Loan> {
    sqlx::query_as::<_, Loan>(
        r#"
        UPDATE loans
        SET status = $1, approved_amount = $2, approval_date = $3, disbursement_date = $4,
            closed_date = $5, final_rating = $6, closure_notes = $7, updated_at = $8
        WHERE id = $9 AND status = $10
        RETURNING *
        "#,
    )
    .bind(loan.status)
    .bind(loan.approved_amount)
    .bind(loan.approval_date)
    .bind(loan.disbursement_date)
    .bind(loan.closed_date)
    .bind(&loan.final_rating)
    .bind(&loan.closure_notes)
    .bind(loan.updated_at)
    .bind(loan.id)
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        DomainError::Conflict(format!(
            "loan {} left status {} before the update committed",
            loan.loan_id, expected
        ))
    })
}

pub async fn insert_appraisal(conn: &mut PgConnection, appraisal: &Appraisal) -> DomainResult<Appraisal> {
    let inserted = sqlx::query_as::<_, Appraisal>(
        r#"
        INSERT INTO appraisals (
            id, loan_id, status, site_visit_date, site_visit_notes, site_visit_photos,
            monthly_income, monthly_expenses, net_cash_flow, debt_service_ratio, credit_score,
            scoring_notes, recommended_amount, recommended_tenure, appraisal_notes,
            recommendation, appraised_by, appraised_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        RETURNING *
        "#,
    )
    .bind(appraisal.id)
    .bind(appraisal.loan_id)
    .bind(appraisal.status)
    .bind(appraisal.site_visit_date)
    .bind(&appraisal.site_visit_notes)
    .bind(&appraisal.site_visit_photos)
    .bind(appraisal.monthly_income)
    .bind(appraisal.monthly_expenses)
    .bind(appraisal.net_cash_flow)
    .bind(appraisal.debt_service_ratio)
    .bind(appraisal.credit_score)
    .bind(&appraisal.scoring_notes)
    .bind(appraisal.recommended_amount)
    .bind(appraisal.recommended_tenure)
    .bind(&appraisal.appraisal_notes)
    .bind(&appraisal.recommendation)
    .bind(appraisal.appraised_by)
    .bind(appraisal.appraised_at)
    .bind(appraisal.created_at)
    .bind(appraisal.updated_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| duplicate_as(e, "appraisal"))?;

    Ok(inserted)
}

pub async fn update_appraisal(conn: &mut PgConnection, appraisal: &Appraisal) -> DomainResult<Appraisal> {
    let updated = sqlx::query_as::<_, Appraisal>(
        r#"
        UPDATE appraisals
        SET status = $1, site_visit_date = $2, site_visit_notes = $3, site_visit_photos = $4,
            monthly_income = $5, monthly_expenses = $6, net_cash_flow = $7,
            debt_service_ratio = $8, credit_score = $9, scoring_notes = $10,
            recommended_amount = $11, recommended_tenure = $12, appraisal_notes = $13,
            recommendation = $14, appraised_by = $15, appraised_at = $16, updated_at = $17
        WHERE id = $18
        RETURNING *
        "#,
    )
    .bind(appraisal.status)
    .bind(appraisal.site_visit_date)
    .bind(&appraisal.site_visit_notes)
    .bind(&appraisal.site_visit_photos)
    .bind(appraisal.monthly_income)
    .bind(appraisal.monthly_expenses)
    .bind(appraisal.net_cash_flow)
    .bind(appraisal.debt_service_ratio)
    .bind(appraisal.credit_score)
    .bind(&appraisal.scoring_notes)
    .bind(appraisal.recommended_amount)
    .bind(appraisal.recommended_tenure)
    .bind(&appraisal.appraisal_notes)
    .bind(&appraisal.recommendation)
    .bind(appraisal.appraised_by)
    .bind(appraisal.appraised_at)
    .bind(appraisal.updated_at)
    .bind(appraisal.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(updated)
}

pub async fn insert_decision(conn: &mut PgConnection, decision: &ApprovalDecision) -> DomainResult<ApprovalDecision> {
    let inserted = sqlx::query_as::<_, ApprovalDecision>(
        r#"
        INSERT INTO approval_decisions (
            id, loan_id, level, decision, approved_amount, conditions, notes, minutes,
            approved_by, approved_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(decision.id)
    .bind(decision.loan_id)
    .bind(decision.level)
    .bind(decision.decision)
    .bind(decision.approved_amount)
    .bind(&decision.conditions)
    .bind(&decision.notes)
    .bind(&decision.minutes)
    .bind(decision.approved_by)
    .bind(decision.approved_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

pub async fn insert_disbursement(conn: &mut PgConnection, disbursement: &Disbursement) -> DomainResult<Disbursement> {
    let inserted = sqlx::query_as::<_, Disbursement>(
        r#"
        INSERT INTO disbursements (
            id, loan_id, amount, method, account_number, account_name, bank_name,
            reference_number, notes, status, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(disbursement.id)
    .bind(disbursement.loan_id)
    .bind(disbursement.amount)
    .bind(disbursement.method)
    .bind(&disbursement.account_number)
    .bind(&disbursement.account_name)
    .bind(&disbursement.bank_name)
    .bind(&disbursement.reference_number)
    .bind(&disbursement.notes)
    .bind(disbursement.status)
    .bind(disbursement.created_at)
    .bind(disbursement.updated_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| duplicate_as(e, "disbursement"))?;

    Ok(inserted)
}

/// Move a disbursement forward if it is still in `expected`
pub async fn update_disbursement(
    conn: &mut PgConnection,
    disbursement: &Disbursement,
    expected: DisbursementStatus,
) -> DomainResult<Disbursement> {
    sqlx::query_as::<_, Disbursement>(
        r#"
        UPDATE disbursements
        SET status = $1, reference_number = $2, notes = $3, verified_by = $4, verified_at = $5,
            disbursed_by = $6, disbursed_at = $7, updated_at = $8
        WHERE id = $9 AND status = $10
        RETURNING *
        "#,
    )
    .bind(disbursement.status)
    .bind(&disbursement.reference_number)
    .bind(&disbursement.notes)
    .bind(disbursement.verified_by)
    .bind(disbursement.verified_at)
    .bind(disbursement.disbursed_by)
    .bind(disbursement.disbursed_at)
    .bind(disbursement.updated_at)
    .bind(disbursement.id)
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DomainError::Conflict(format!("disbursement {} changed concurrently", disbursement.id)))
}

/// Bulk insert of a freshly generated schedule
pub async fn insert_schedule(conn: &mut PgConnection, schedule: &[RepaymentInstallment]) -> DomainResult<()> {
    if schedule.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO repayment_schedules (id, loan_id, installment_number, due_date, \
         principal_amount, interest_amount, total_amount, outstanding_principal, \
         outstanding_interest, outstanding_total, created_at) ",
    );
    query_builder.push_values(schedule, |mut row, installment| {
        row.push_bind(installment.id)
            .push_bind(installment.loan_id)
            .push_bind(installment.installment_number)
            .push_bind(installment.due_date)
            .push_bind(installment.principal_amount)
            .push_bind(installment.interest_amount)
            .push_bind(installment.total_amount)
            .push_bind(installment.outstanding_principal)
            .push_bind(installment.outstanding_interest)
            .push_bind(installment.outstanding_total)
            .push_bind(installment.created_at);
    });

    query_builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| duplicate_as(e, "repayment schedule"))?;

    Ok(())
}

fn push_loan_filters(query_builder: &mut QueryBuilder<'_, Postgres>, query: &ListLoansQuery) {
    if let Some(status) = query.status {
        query_builder.push(" AND status = ");
        query_builder.push_bind(status);
    }
    if let Some(purpose) = query.purpose {
        query_builder.push(" AND purpose = ");
        query_builder.push_bind(purpose);
    }
    if let Some(customer_id) = query.customer_id {
        query_builder.push(" AND customer_id = ");
        query_builder.push_bind(customer_id);
    }
    if let Some(officer_id) = query.loan_officer_id {
        query_builder.push(" AND loan_officer_id = ");
        query_builder.push_bind(officer_id);
    }
    if let Some(branch_id) = query.branch_id {
        query_builder.push(" AND branch_id = ");
        query_builder.push_bind(branch_id);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = db::contains_pattern(search);
        query_builder.push(" AND (loan_id ILIKE ");
        query_builder.push_bind(pattern.clone());
        query_builder.push(" ESCAPE '\\' OR product_name ILIKE ");
        query_builder.push_bind(pattern.clone());
        query_builder.push(" ESCAPE '\\' OR customer_id IN (SELECT id FROM customers WHERE first_name ILIKE ");
        query_builder.push_bind(pattern.clone());
        query_builder.push(" ESCAPE '\\' OR last_name ILIKE ");
        query_builder.push_bind(pattern);
        query_builder.push(" ESCAPE '\\'))");
    }
}

/// Normalised `(page, limit)` for a loan listing
pub fn page_bounds(query: &ListLoansQuery) -> (i64, i64) {
    db::page_window(query.page, query.limit)
}

pub async fn list_loans(conn: &mut PgConnection, query: &ListLoansQuery) -> DomainResult<(Vec<Loan>, i64)> {
    let (page, limit) = page_bounds(query);

    let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM loans WHERE 1=1");
    push_loan_filters(&mut count_builder, query);
    let (total,): (i64,) = count_builder.build_query_as().fetch_one(&mut *conn).await?;

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM loans WHERE 1=1");
    push_loan_filters(&mut query_builder, query);
    query_builder.push(" ORDER BY created_at DESC LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind((page - 1) * limit);

    let loans = query_builder
        .build_query_as::<Loan>()
        .fetch_all(&mut *conn)
        .await?;

    Ok((loans, total))
}

/// Name the entity in a unique violation instead of the constraint
fn duplicate_as(err: sqlx::Error, entity: &str) -> DomainError {
    match DomainError::from(err) {
        DomainError::DuplicateResource(_) => DomainError::DuplicateResource(entity.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(&ListLoansQuery::default()), (1, 20));

        let query = ListLoansQuery {
            page: Some(0),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(page_bounds(&query), (1, db::MAX_PAGE_SIZE));

        let query = ListLoansQuery {
            page: Some(3),
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(page_bounds(&query), (3, 1));
    }

    #[test]
    fn test_page_bounds_caps_runaway_page() {
        let query = ListLoansQuery {
            page: Some(i64::MAX),
            ..Default::default()
        };
        let (page, limit) = page_bounds(&query);
        assert!((page - 1).checked_mul(limit).is_some());
    }

    #[test]
    fn test_search_matches_customer_names_literally() {
        let query = ListLoansQuery {
            search: Some(" 100%_ ".into()),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM loans WHERE 1=1");
        push_loan_filters(&mut builder, &query);
        let sql = builder.sql();

        assert!(sql.contains("first_name ILIKE $3 ESCAPE '\\'"));
        assert!(sql.contains("last_name ILIKE $4 ESCAPE '\\'"));
        assert_eq!(db::contains_pattern("100%_"), "%100\\%\\_%");
    }
}
