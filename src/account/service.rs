//! Account service: eligibility-gated provisioning and the account status
//! lifecycle

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::model::*;
use crate::branch;
use crate::context::RequestContext;
use crate::customer;
use crate::db::{run_guarded, with_deadline};
use crate::eligibility::{self, CustomerFacts, EligibilityReport, ProductFacts};
use crate::error::{DomainError, DomainResult};
use crate::sequence;

/// Gate outcome plus the rows it was computed from
struct Assessment {
    report: EligibilityReport,
    branch_id: Option<Uuid>,
}

async fn assess(conn: &mut PgConnection, customer_id: Uuid, product_id: Uuid) -> DomainResult<Assessment> {
    let loaded = customer::load_customer(conn, customer_id).await?;

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

    let existing: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT account_number FROM accounts
        WHERE customer_id = $1 AND product_id = $2 AND status = $3
        LIMIT 1
        "#,
    )
    .bind(customer_id)
    .bind(product_id)
    .bind(AccountStatus::Active)
    .fetch_optional(&mut *conn)
    .await?;

    let customer_facts = loaded.as_ref().map(|(customer, kyc)| CustomerFacts {
        status: customer.status,
        kyc: kyc.as_ref(),
    });
    let product_facts = product.as_ref().map(|p| ProductFacts {
        name: &p.name,
        status: p.status,
        allow_multiple: p.allow_multiple,
        existing_account: existing.as_ref().map(|(n,)| n.as_str()),
    });

    let failures = eligibility::assess(customer_facts.as_ref(), Some(product_facts.as_ref()));

    Ok(Assessment {
        report: EligibilityReport::from(failures),
        branch_id: loaded.map(|(c, _)| c.branch_id),
    })
}

#[derive(Clone)]
pub struct AccountService {
    db_pool: PgPool,
}

impl AccountService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn create_product(&self, ctx: &RequestContext, request: CreateProductRequest) -> DomainResult<Product> {
        let request = &request;
        let product = run_guarded("create_product", ctx.timeout, move || async move {
            let product = sqlx::query_as::<_, Product>(
                r#"
                INSERT INTO products (id, name, kind, status, allow_multiple, created_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&request.name)
            .bind(request.kind)
            .bind(ProductStatus::Active)
            .bind(request.allow_multiple)
            .fetch_one(&self.db_pool)
            .await?;
            Ok::<_, DomainError>(product)
        })
        .await?;

        tracing::info!(product_id = %product.id, name = %product.name, "Product created");

        Ok(product)
    }

    pub async fn list_products(&self, ctx: &RequestContext) -> DomainResult<Vec<Product>> {
        with_deadline("list_products", ctx.timeout, async {
            let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name")
                .fetch_all(&self.db_pool)
                .await?;
            Ok::<_, DomainError>(products)
        })
        .await
    }

    /// Full list of reasons the customer cannot open the product
    pub async fn check_eligibility(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> DomainResult<EligibilityReport> {
        with_deadline("check_eligibility", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;
            Ok::<_, DomainError>(assess(&mut conn, customer_id, product_id).await?.report)
        })
        .await
    }

    /// Open an account once the customer passes the gate
    pub async fn open_account(&self, ctx: &RequestContext, request: OpenAccountRequest) -> DomainResult<Account> {
        let request = &request;
        run_guarded("open_account", ctx.timeout, move || self.try_open_account(ctx, request)).await
    }

    async fn try_open_account(&self, ctx: &RequestContext, request: &OpenAccountRequest) -> DomainResult<Account> {
        let mut tx = self.db_pool.begin().await?;

        // Serializes concurrent openings for the same customer
        sqlx::query("SELECT id FROM customers WHERE id = $1 FOR UPDATE")
            .bind(request.customer_id)
            .execute(&mut *tx)
            .await?;

        let assessment = assess(&mut tx, request.customer_id, request.product_id).await?;
        assessment.report.into_result()?;

        let branch_id = assessment
            .branch_id
            .ok_or_else(|| DomainError::not_found("customer", request.customer_id))?;
        let branch_code = branch::find_code(&mut tx, branch_id).await?;
        let account_number = sequence::next_account_number(&mut tx, &branch_code).await?;

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, account_number, customer_id, product_id, branch_id, status, opened_by, opened_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&account_number)
        .bind(request.customer_id)
        .bind(request.product_id)
        .bind(branch_id)
        .bind(AccountStatus::Active)
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            account_number = %account.account_number,
            customer_id = %account.customer_id,
            "Account opened"
        );

        Ok(account)
    }

    pub async fn list_customer_accounts(&self, ctx: &RequestContext, customer_id: Uuid) -> DomainResult<Vec<Account>> {
        with_deadline("list_customer_accounts", ctx.timeout, async {
            let accounts = sqlx::query_as::<_, Account>(
                "SELECT * FROM accounts WHERE customer_id = $1 ORDER BY opened_at",
            )
            .bind(customer_id)
            .fetch_all(&self.db_pool)
            .await?;
            Ok::<_, DomainError>(accounts)
        })
        .await
    }

    /// Look an account up by its number. The number must be well formed and
    /// its embedded branch code must match the owning branch.
    pub async fn find_by_number(&self, ctx: &RequestContext, account_number: &str) -> DomainResult<Account> {
        let branch_code = sequence::extract_branch_code(account_number)?;

        with_deadline("find_account", ctx.timeout, async {
            sqlx::query_as::<_, Account>(
                r#"
                SELECT a.* FROM accounts a
                JOIN branches b ON b.id = a.branch_id
                WHERE a.account_number = $1 AND b.code = $2
                "#,
            )
            .bind(account_number)
            .bind(branch_code)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| DomainError::not_found("account", account_number))
        })
        .await
    }

    /// Status changes of an account, oldest first
    pub async fn history(&self, ctx: &RequestContext, account_id: Uuid) -> DomainResult<Vec<AccountHistory>> {
        with_deadline("account_history", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&mut *conn)
                .await?;
            if exists.is_none() {
                return Err(DomainError::not_found("account", account_id));
            }

            let history = sqlx::query_as::<_, AccountHistory>(
                "SELECT * FROM account_history WHERE account_id = $1 ORDER BY performed_at, id",
            )
            .bind(account_id)
            .fetch_all(&mut *conn)
            .await?;
            Ok::<_, DomainError>(history)
        })
        .await
    }

    pub async fn activate(&self, ctx: &RequestContext, account_id: Uuid) -> DomainResult<Account> {
        self.change_status(ctx, account_id, AccountAction::Activate, AccountStatusChange::default())
            .await
    }

    pub async fn suspend(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        change: AccountStatusChange,
    ) -> DomainResult<Account> {
        self.change_status(ctx, account_id, AccountAction::Suspend, change).await
    }

    pub async fn reactivate(&self, ctx: &RequestContext, account_id: Uuid) -> DomainResult<Account> {
        self.change_status(ctx, account_id, AccountAction::Reactivate, AccountStatusChange::default())
            .await
    }

    pub async fn close(&self, ctx: &RequestContext, account_id: Uuid, change: AccountStatusChange) -> DomainResult<Account> {
        self.change_status(ctx, account_id, AccountAction::Close, change).await
    }

    async fn change_status(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        action: AccountAction,
        change: AccountStatusChange,
    ) -> DomainResult<Account> {
        let reason = change.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        if action.needs_reason() && reason.is_none() {
            return Err(DomainError::validation(format!("{} needs a reason", action.as_str())));
        }

        run_guarded(action.as_str(), ctx.timeout, move || {
            self.try_change_status(ctx, account_id, action, reason)
        })
        .await
    }

    async fn try_change_status(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        action: AccountAction,
        reason: Option<&str>,
    ) -> DomainResult<Account> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found("account", account_id))?;

        let next = action.apply(current.status)?;
        let closing = next == AccountStatus::Closed;

        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET status = $1,
                closed_at = CASE WHEN $2 THEN NOW() ELSE closed_at END,
                closure_reason = CASE WHEN $2 THEN $3 ELSE closure_reason END,
                updated_at = NOW()
            WHERE id = $4 AND status = $5
            RETURNING *
            "#,
        )
        .bind(next)
        .bind(closing)
        .bind(reason)
        .bind(account_id)
        .bind(current.status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::Conflict(format!("account {} changed concurrently", account_id)))?;

        sqlx::query(
            r#"
            INSERT INTO account_history (id, account_id, action, old_status, new_status, reason, performed_by, performed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(action.event())
        .bind(current.status)
        .bind(next)
        .bind(reason)
        .bind(ctx.actor_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            account_number = %account.account_number,
            from = ?current.status,
            to = ?account.status,
            actor_id = %ctx.actor_id,
            "Account status changed"
        );

        Ok(account)
    }
}
