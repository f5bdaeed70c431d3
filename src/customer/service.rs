//! Customer service layer

use chrono::{Datelike, Duration};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::model::*;
use crate::branch;
use crate::context::RequestContext;
use crate::db::{self, run_guarded, with_deadline};
use crate::error::{DomainError, DomainResult};
use crate::sequence;

/// KYC status of an existing customer; `None` when no profile was started
pub async fn kyc_status(conn: &mut PgConnection, customer_id: Uuid) -> DomainResult<Option<KycStatus>> {
    let row: Option<(Option<KycStatus>,)> = sqlx::query_as(
        r#"
        SELECT k.status
        FROM customers c
        LEFT JOIN kyc_profiles k ON k.customer_id = c.id
        WHERE c.id = $1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(status,)| status)
        .ok_or_else(|| DomainError::not_found("customer", customer_id))
}

/// Customer together with its KYC profile, if the customer exists
pub async fn load_customer(
    conn: &mut PgConnection,
    customer_id: Uuid,
) -> DomainResult<Option<(Customer, Option<KycProfile>)>> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;

    let customer = match customer {
        Some(customer) => customer,
        None => return Ok(None),
    };

    let kyc = sqlx::query_as::<_, KycProfile>("SELECT * FROM kyc_profiles WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(Some((customer, kyc)))
}

/// Days until an assessed risk profile is due for review
const RISK_REVIEW_DAYS: i64 = 180;

async fn load_risk(conn: &mut PgConnection, customer_id: Uuid) -> DomainResult<Option<RiskProfile>> {
    let risk = sqlx::query_as::<_, RiskProfile>("SELECT * FROM risk_profiles WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(risk)
}

async fn national_id_taken(conn: &mut PgConnection, national_id: &str, except: Option<Uuid>) -> DomainResult<()> {
    let taken: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM customers WHERE national_id = $1 AND id IS DISTINCT FROM $2")
            .bind(national_id)
            .bind(except)
            .fetch_optional(&mut *conn)
            .await?;

    match taken {
        Some(_) => Err(DomainError::DuplicateResource(format!(
            "customer with national ID {}",
            national_id
        ))),
        None => Ok(()),
    }
}

fn push_customer_filters(query_builder: &mut QueryBuilder<'_, Postgres>, query: &ListCustomersQuery) {
    if let Some(status) = query.status {
        query_builder.push(" AND c.status = ");
        query_builder.push_bind(status);
    }
    if let Some(branch_id) = query.branch_id {
        query_builder.push(" AND c.branch_id = ");
        query_builder.push_bind(branch_id);
    }
    if let Some(risk_level) = query.risk_level {
        query_builder.push(" AND r.risk_level = ");
        query_builder.push_bind(risk_level);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = db::contains_pattern(search);
        let columns = ["c.customer_id", "c.first_name", "c.last_name", "c.email", "c.phone", "c.national_id"];
        query_builder.push(" AND (");
        for (index, column) in columns.iter().enumerate() {
            if index > 0 {
                query_builder.push(" OR ");
            }
            query_builder.push(*column);
            query_builder.push(" ILIKE ");
            query_builder.push_bind(pattern.clone());
            query_builder.push(" ESCAPE '\\'");
        }
        query_builder.push(")");
    }
}

const CUSTOMER_LIST_FROM: &str = " FROM customers c LEFT JOIN risk_profiles r ON r.customer_id = c.id WHERE 1=1";

fn merged_profile(current: &KycProfile, request: &UpdateKycRequest) -> KycProfile {
    let mut next = current.clone();
    if let Some(flag) = request.has_national_id {
        next.has_national_id = flag;
    }
    if let Some(flag) = request.has_proof_of_address {
        next.has_proof_of_address = flag;
    }
    if let Some(flag) = request.has_photo_proof {
        next.has_photo_proof = flag;
    }
    if let Some(flag) = request.has_income_proof {
        next.has_income_proof = flag;
    }
    next.status = if next.identity_documents_present() {
        KycStatus::Complete
    } else {
        KycStatus::Incomplete
    };
    next
}

/// Customer service
#[derive(Clone)]
pub struct CustomerService {
    db_pool: PgPool,
}

impl CustomerService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Register a PROSPECT customer with a PENDING KYC profile
    pub async fn create(&self, ctx: &RequestContext, request: CreateCustomerRequest) -> DomainResult<Customer> {
        let request = &request;
        run_guarded("create_customer", ctx.timeout, move || self.try_create(ctx, request)).await
    }

    async fn try_create(&self, ctx: &RequestContext, request: &CreateCustomerRequest) -> DomainResult<Customer> {
        let mut tx = self.db_pool.begin().await?;

        let branch_code = branch::find_code(&mut tx, request.branch_id).await?;

        if let Some(national_id) = &request.national_id {
            national_id_taken(&mut tx, national_id, None).await?;
        }

        let now = chrono::Utc::now();
        let customer_code = sequence::next_customer_id(&mut tx, &branch_code, now.year()).await?;

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (
                id, customer_id, branch_id, first_name, last_name, phone, email,
                national_id, date_of_birth, address, status, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&customer_code)
        .bind(request.branch_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.phone)
        .bind(&request.email)
        .bind(&request.national_id)
        .bind(request.date_of_birth)
        .bind(&request.address)
        .bind(CustomerStatus::Prospect)
        .bind(ctx.actor_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO kyc_profiles (id, customer_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer.id)
        .bind(KycStatus::Pending)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO risk_profiles (id, customer_id, risk_level, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer.id)
        .bind(RiskLevel::Medium)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            customer_id = %customer.id,
            customer_code = %customer.customer_id,
            "Customer registered"
        );

        Ok(customer)
    }

    pub async fn get(&self, ctx: &RequestContext, customer_id: Uuid) -> DomainResult<CustomerDetails> {
        with_deadline("get_customer", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;
            let (customer, kyc) = load_customer(&mut conn, customer_id)
                .await?
                .ok_or_else(|| DomainError::not_found("customer", customer_id))?;
            let risk = load_risk(&mut conn, customer_id).await?;

            Ok::<_, DomainError>(CustomerDetails { customer, kyc, risk })
        })
        .await
    }

    /// Filtered, newest-first customer listing
    pub async fn list(&self, ctx: &RequestContext, query: ListCustomersQuery) -> DomainResult<CustomerPage> {
        let (page, limit) = db::page_window(query.page, query.limit);

        let (data, total) = with_deadline("list_customers", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;

            let mut count_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT COUNT(*){}", CUSTOMER_LIST_FROM));
            push_customer_filters(&mut count_builder, &query);
            let (total,): (i64,) = count_builder.build_query_as().fetch_one(&mut *conn).await?;

            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT c.*{}", CUSTOMER_LIST_FROM));
            push_customer_filters(&mut query_builder, &query);
            query_builder.push(" ORDER BY c.created_at DESC LIMIT ");
            query_builder.push_bind(limit);
            query_builder.push(" OFFSET ");
            query_builder.push_bind((page - 1) * limit);

            let customers = query_builder
                .build_query_as::<Customer>()
                .fetch_all(&mut *conn)
                .await?;

            Ok::<_, DomainError>((customers, total))
        })
        .await?;

        Ok(CustomerPage {
            data,
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        })
    }

    /// Edit profile fields; a new branch must exist and a new national ID
    /// must be unused
    pub async fn update(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> DomainResult<Customer> {
        let request = &request;
        run_guarded("update_customer", ctx.timeout, move || self.try_update(customer_id, request)).await
    }

    async fn try_update(&self, customer_id: Uuid, request: &UpdateCustomerRequest) -> DomainResult<Customer> {
        let mut tx = self.db_pool.begin().await?;

        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM customers WHERE id = $1 FOR UPDATE")
            .bind(customer_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(DomainError::not_found("customer", customer_id));
        }
        if let Some(branch_id) = request.branch_id {
            branch::find_code(&mut tx, branch_id).await?;
        }
        if let Some(national_id) = &request.national_id {
            national_id_taken(&mut tx, national_id, Some(customer_id)).await?;
        }

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET branch_id = COALESCE($1, branch_id),
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                national_id = COALESCE($6, national_id),
                date_of_birth = COALESCE($7, date_of_birth),
                address = COALESCE($8, address),
                updated_at = NOW()
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(request.branch_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.phone)
        .bind(&request.email)
        .bind(&request.national_id)
        .bind(request.date_of_birth)
        .bind(&request.address)
        .bind(customer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(customer_id = %customer.id, customer_code = %customer.customer_id, "Customer updated");

        Ok(customer)
    }

    /// Record a risk assessment and schedule the next review
    pub async fn update_risk_profile(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
        request: UpdateRiskProfileRequest,
    ) -> DomainResult<RiskProfile> {
        let request = &request;
        run_guarded("update_risk_profile", ctx.timeout, move || {
            self.try_update_risk_profile(ctx, customer_id, request)
        })
        .await
    }

    async fn try_update_risk_profile(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
        request: &UpdateRiskProfileRequest,
    ) -> DomainResult<RiskProfile> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, RiskProfile>(
            "SELECT * FROM risk_profiles WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::not_found("risk profile", customer_id))?;

        let now = chrono::Utc::now();
        let next_review = now.date_naive() + Duration::days(RISK_REVIEW_DAYS);

        let profile = sqlx::query_as::<_, RiskProfile>(
            r#"
            UPDATE risk_profiles
            SET risk_level = $1,
                credit_score = COALESCE($2, credit_score),
                delinquency_history = COALESCE($3, delinquency_history),
                multiple_borrowing = COALESCE($4, multiple_borrowing),
                political_exposure = COALESCE($5, political_exposure),
                high_risk_occupation = COALESCE($6, high_risk_occupation),
                assessment_notes = COALESCE($7, assessment_notes),
                assessed_by = $8,
                assessed_at = $9,
                next_review_date = $10,
                updated_at = $9
            WHERE id = $11
            RETURNING *
            "#,
        )
        .bind(request.risk_level)
        .bind(request.credit_score)
        .bind(request.delinquency_history)
        .bind(request.multiple_borrowing)
        .bind(request.political_exposure)
        .bind(request.high_risk_occupation)
        .bind(&request.assessment_notes)
        .bind(ctx.actor_id)
        .bind(now)
        .bind(next_review)
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            customer_id = %customer_id,
            from = ?current.risk_level,
            to = ?profile.risk_level,
            "Risk profile assessed"
        );

        Ok(profile)
    }

    /// Update the document checklist and recompute KYC status
    pub async fn update_kyc(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
        request: UpdateKycRequest,
    ) -> DomainResult<KycProfile> {
        let request = &request;
        run_guarded("update_kyc", ctx.timeout, move || {
            self.try_update_kyc(ctx, customer_id, request)
        })
        .await
    }

    async fn try_update_kyc(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
        request: &UpdateKycRequest,
    ) -> DomainResult<KycProfile> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, KycProfile>(
            "SELECT * FROM kyc_profiles WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::not_found("KYC profile", customer_id))?;

        let next = merged_profile(&current, request);
        let (verified_by, verified_at) = if next.status == KycStatus::Complete {
            (Some(ctx.actor_id), Some(chrono::Utc::now()))
        } else {
            (None, None)
        };

        let profile = sqlx::query_as::<_, KycProfile>(
            r#"
            UPDATE kyc_profiles
            SET status = $1, has_national_id = $2, has_proof_of_address = $3,
                has_photo_proof = $4, has_income_proof = $5,
                verified_by = $6, verified_at = $7, updated_at = NOW()
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(next.status)
        .bind(next.has_national_id)
        .bind(next.has_proof_of_address)
        .bind(next.has_photo_proof)
        .bind(next.has_income_proof)
        .bind(verified_by)
        .bind(verified_at)
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(customer_id = %customer_id, status = ?profile.status, "KYC profile updated");

        Ok(profile)
    }

    /// PROSPECT -> ACTIVE once KYC is complete
    pub async fn activate(&self, ctx: &RequestContext, customer_id: Uuid) -> DomainResult<Customer> {
        run_guarded("activate_customer", ctx.timeout, move || self.try_activate(customer_id)).await
    }

    async fn try_activate(&self, customer_id: Uuid) -> DomainResult<Customer> {
        let mut tx = self.db_pool.begin().await?;

        let (customer, kyc) = load_customer(&mut tx, customer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("customer", customer_id))?;

        if customer.status != CustomerStatus::Prospect {
            return Err(DomainError::validation(format!(
                "only PROSPECT customers can be activated, customer is {:?}",
                customer.status
            )));
        }
        crate::eligibility::require_complete_kyc(kyc.map(|k| k.status))?;

        let customer = self.set_status(&mut tx, customer_id, CustomerStatus::Active).await?;
        tx.commit().await?;

        tracing::info!(customer_id = %customer_id, "Customer activated");

        Ok(customer)
    }

    pub async fn blacklist(&self, ctx: &RequestContext, customer_id: Uuid) -> DomainResult<Customer> {
        run_guarded("blacklist_customer", ctx.timeout, move || async move {
            let mut tx = self.db_pool.begin().await?;
            let customer = self.set_status(&mut tx, customer_id, CustomerStatus::Blacklisted).await?;
            tx.commit().await?;

            tracing::warn!(customer_id = %customer_id, actor_id = %ctx.actor_id, "Customer blacklisted");

            Ok::<_, DomainError>(customer)
        })
        .await
    }

    async fn set_status(
        &self,
        conn: &mut PgConnection,
        customer_id: Uuid,
        status: CustomerStatus,
    ) -> DomainResult<Customer> {
        sqlx::query_as::<_, Customer>(
            "UPDATE customers SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(status)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DomainError::not_found("customer", customer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use validator::Validate;

    fn pending_profile() -> KycProfile {
        KycProfile {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            status: KycStatus::Pending,
            has_national_id: false,
            has_proof_of_address: false,
            has_photo_proof: false,
            has_income_proof: false,
            verified_by: None,
            verified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_partial_checklist_is_incomplete() {
        let request = UpdateKycRequest {
            has_national_id: Some(true),
            ..Default::default()
        };
        let next = merged_profile(&pending_profile(), &request);
        assert_eq!(next.status, KycStatus::Incomplete);
        assert!(next.has_national_id);
    }

    #[test]
    fn test_identity_documents_complete_kyc() {
        let request = UpdateKycRequest {
            has_national_id: Some(true),
            has_proof_of_address: Some(true),
            has_photo_proof: Some(true),
            has_income_proof: None,
        };
        let next = merged_profile(&pending_profile(), &request);
        assert_eq!(next.status, KycStatus::Complete);
        assert!(!next.has_income_proof);
    }

    #[test]
    fn test_search_covers_identity_columns_literally() {
        let query = ListCustomersQuery {
            search: Some("o_neil".into()),
            risk_level: Some(RiskLevel::High),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT c.*");
        builder.push(CUSTOMER_LIST_FROM);
        push_customer_filters(&mut builder, &query);
        let sql = builder.sql();

        assert!(sql.contains("r.risk_level = $1"));
        for column in ["c.customer_id", "c.first_name", "c.last_name", "c.email", "c.phone", "c.national_id"] {
            assert!(sql.contains(&format!("{} ILIKE", column)), "{} is not searched", column);
        }
        assert_eq!(sql.matches("ESCAPE '\\'").count(), 6);
    }

    #[test]
    fn test_update_request_validation() {
        let request = UpdateCustomerRequest {
            phone: Some("12".into()),
            ..Default::default()
        };
        assert!(request.validate().is_err());
        assert!(UpdateCustomerRequest::default().validate().is_ok());
    }

    #[test]
    fn test_credit_score_range() {
        let request = UpdateRiskProfileRequest {
            risk_level: RiskLevel::Low,
            credit_score: Some(1200),
            delinquency_history: None,
            multiple_borrowing: None,
            political_exposure: None,
            high_risk_occupation: None,
            assessment_notes: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_omitted_flags_keep_stored_values() {
        let mut current = pending_profile();
        current.has_national_id = true;
        current.has_proof_of_address = true;
        let request = UpdateKycRequest {
            has_photo_proof: Some(true),
            ..Default::default()
        };
        assert_eq!(merged_profile(&current, &request).status, KycStatus::Complete);
    }
}
