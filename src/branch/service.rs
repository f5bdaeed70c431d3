//! Branch service

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{Branch, CreateBranchRequest, UpdateBranchRequest};
use crate::context::RequestContext;
use crate::db::{run_guarded, with_deadline};
use crate::error::{DomainError, DomainResult};

/// Code of an existing branch, used to scope generated identifiers
pub async fn find_code(conn: &mut PgConnection, branch_id: Uuid) -> DomainResult<String> {
    let code: Option<(String,)> = sqlx::query_as("SELECT code FROM branches WHERE id = $1")
        .bind(branch_id)
        .fetch_optional(&mut *conn)
        .await?;

    code.map(|(c,)| c)
        .ok_or_else(|| DomainError::not_found("branch", branch_id))
}

#[derive(Clone)]
pub struct BranchService {
    db_pool: PgPool,
}

impl BranchService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn create(&self, ctx: &RequestContext, request: CreateBranchRequest) -> DomainResult<Branch> {
        let request = &request;
        let branch = run_guarded("create_branch", ctx.timeout, move || async move {
            sqlx::query_as::<_, Branch>(
                r#"
                INSERT INTO branches (id, code, name, address, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&request.code)
            .bind(&request.name)
            .bind(&request.address)
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| match DomainError::from(e) {
                DomainError::DuplicateResource(_) => {
                    DomainError::DuplicateResource(format!("branch code {}", request.code))
                }
                other => other,
            })
        })
        .await?;

        tracing::info!(branch_id = %branch.id, code = %branch.code, "Branch created");

        Ok(branch)
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        branch_id: Uuid,
        request: UpdateBranchRequest,
    ) -> DomainResult<Branch> {
        let request = &request;
        let branch = run_guarded("update_branch", ctx.timeout, move || async move {
            sqlx::query_as::<_, Branch>(
                r#"
                UPDATE branches
                SET name = COALESCE($1, name), address = COALESCE($2, address)
                WHERE id = $3
                RETURNING *
                "#,
            )
            .bind(&request.name)
            .bind(&request.address)
            .bind(branch_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| DomainError::not_found("branch", branch_id))
        })
        .await?;

        tracing::info!(branch_id = %branch.id, code = %branch.code, "Branch updated");

        Ok(branch)
    }

    pub async fn get(&self, ctx: &RequestContext, branch_id: Uuid) -> DomainResult<Branch> {
        with_deadline("get_branch", ctx.timeout, async {
            sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = $1")
                .bind(branch_id)
                .fetch_optional(&self.db_pool)
                .await?
                .ok_or_else(|| DomainError::not_found("branch", branch_id))
        })
        .await
    }

    pub async fn list(&self, ctx: &RequestContext) -> DomainResult<Vec<Branch>> {
        with_deadline("list_branches", ctx.timeout, async {
            let branches = sqlx::query_as::<_, Branch>("SELECT * FROM branches ORDER BY code")
                .fetch_all(&self.db_pool)
                .await?;
            Ok::<_, DomainError>(branches)
        })
        .await
    }
}
