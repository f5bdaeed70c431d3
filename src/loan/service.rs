//! Loan service layer
//!
//! Each transition is one transaction: lock the loan row, load the slices
//! the transition reads, apply it to the aggregate, write the result and
//! commit. Transitions run through [`run_guarded`] so they carry the caller's
//! deadline and survive one serialization conflict; reads only carry the
//! deadline.

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::model::*;
use super::repo;
use crate::branch;
use crate::context::RequestContext;
use crate::customer;
use crate::db::{run_guarded, with_deadline};
use crate::error::{DomainError, DomainResult};
use crate::sequence;

/// Loan service for managing the loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
}

impl LoanService {
    /// Create a new loan service instance
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Open a DRAFT application
    pub async fn create(&self, ctx: &RequestContext, request: CreateLoanRequest) -> DomainResult<Loan> {
        let request = &request;
        run_guarded("create_loan", ctx.timeout, move || self.try_create(ctx, request)).await
    }

    async fn try_create(&self, ctx: &RequestContext, request: &CreateLoanRequest) -> DomainResult<Loan> {
        let mut tx = self.db_pool.begin().await?;

        let kyc = customer::kyc_status(&mut tx, request.customer_id).await?;
        let branch_code = branch::find_code(&mut tx, request.branch_id).await?;
        if !repo::user_exists(&mut tx, request.loan_officer_id).await? {
            return Err(DomainError::not_found("loan officer", request.loan_officer_id));
        }

        let now = Utc::now();
        let loan_code = sequence::next_loan_id(&mut tx, &branch_code, now.year()).await?;
        let aggregate = LoanAggregate::draft(request, loan_code, kyc, ctx.actor_id, now)?;
        let loan = repo::insert_loan(&mut tx, &aggregate.loan).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            loan_code = %loan.loan_id,
            customer_id = %loan.customer_id,
            amount = %loan.requested_amount,
            "Loan application created"
        );

        Ok(loan)
    }

    /// Edit a DRAFT loan
    pub async fn update(&self, ctx: &RequestContext, id: Uuid, request: UpdateLoanRequest) -> DomainResult<Loan> {
        let request = &request;
        run_guarded("update_loan", ctx.timeout, move || self.try_update(id, request)).await
    }

    async fn try_update(&self, id: Uuid, request: &UpdateLoanRequest) -> DomainResult<Loan> {
        let mut tx = self.db_pool.begin().await?;

        let mut aggregate = LoanAggregate::new(repo::lock_loan(&mut tx, id).await?);
        if let Some(officer) = request.loan_officer_id {
            if !repo::user_exists(&mut tx, officer).await? {
                return Err(DomainError::not_found("loan officer", officer));
            }
        }
        aggregate.update_draft(request, Utc::now())?;
        let loan = repo::update_terms(&mut tx, &aggregate.loan).await?;

        tx.commit().await?;

        tracing::info!(loan_id = %loan.id, "Draft loan updated");

        Ok(loan)
    }

    /// Full aggregate view
    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> DomainResult<LoanAggregate> {
        with_deadline("get_loan", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;
            repo::load_full(&mut conn, id).await
        })
        .await
    }

    pub async fn list(&self, ctx: &RequestContext, query: ListLoansQuery) -> DomainResult<LoanPage> {
        let (page, limit) = repo::page_bounds(&query);
        let (data, total) = with_deadline("list_loans", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;
            repo::list_loans(&mut conn, &query).await
        })
        .await?;

        Ok(LoanPage {
            data,
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        })
    }

    pub async fn schedule(&self, ctx: &RequestContext, id: Uuid) -> DomainResult<Vec<RepaymentInstallment>> {
        with_deadline("get_schedule", ctx.timeout, async {
            let mut conn = self.db_pool.acquire().await?;
            repo::find_loan(&mut conn, id).await?;
            repo::load_schedule(&mut conn, id).await
        })
        .await
    }

    /// DRAFT -> APPLICATION_SUBMITTED
    pub async fn submit(&self, ctx: &RequestContext, id: Uuid) -> DomainResult<Loan> {
        run_guarded("submit_loan", ctx.timeout, move || self.try_submit(id)).await
    }

    async fn try_submit(&self, id: Uuid) -> DomainResult<Loan> {
        let mut tx = self.db_pool.begin().await?;

        let mut aggregate = LoanAggregate::new(repo::lock_loan(&mut tx, id).await?);
        let before = aggregate.status();
        let kyc = customer::kyc_status(&mut tx, aggregate.loan.customer_id).await?;
        aggregate.submit(kyc, Utc::now())?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        log_transition(&loan, before);
        Ok(loan)
    }

    /// APPLICATION_SUBMITTED -> UNDER_APPRAISAL
    pub async fn create_appraisal(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: AppraisalRequest,
    ) -> DomainResult<Appraisal> {
        let request = &request;
        run_guarded("create_appraisal", ctx.timeout, move || {
            self.try_create_appraisal(ctx, id, request)
        })
        .await
    }

    async fn try_create_appraisal(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: &AppraisalRequest,
    ) -> DomainResult<Appraisal> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let appraisal = repo::load_appraisal(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan).with_appraisal(appraisal);
        let before = aggregate.status();

        let created = aggregate
            .open_appraisal(request, ctx.actor_id, Utc::now())?
            .clone();
        let appraisal = repo::insert_appraisal(&mut tx, &created).await?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        log_transition(&loan, before);
        Ok(appraisal)
    }

    /// Revise an in-progress appraisal
    pub async fn update_appraisal(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: AppraisalRequest,
    ) -> DomainResult<Appraisal> {
        let request = &request;
        run_guarded("update_appraisal", ctx.timeout, move || {
            self.try_update_appraisal(id, request)
        })
        .await
    }

    async fn try_update_appraisal(&self, id: Uuid, request: &AppraisalRequest) -> DomainResult<Appraisal> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let appraisal = repo::load_appraisal(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan).with_appraisal(appraisal);

        let revised = aggregate.revise_appraisal(request, Utc::now())?.clone();
        let appraisal = repo::update_appraisal(&mut tx, &revised).await?;

        tx.commit().await?;

        tracing::info!(loan_id = %id, appraisal_id = %appraisal.id, "Appraisal updated");

        Ok(appraisal)
    }

    /// Freeze the appraisal; the loan moves to PENDING_APPROVAL
    pub async fn complete_appraisal(&self, ctx: &RequestContext, id: Uuid) -> DomainResult<Appraisal> {
        run_guarded("complete_appraisal", ctx.timeout, move || {
            self.try_complete_appraisal(ctx, id)
        })
        .await
    }

    async fn try_complete_appraisal(&self, ctx: &RequestContext, id: Uuid) -> DomainResult<Appraisal> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let appraisal = repo::load_appraisal(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan).with_appraisal(appraisal);
        let before = aggregate.status();

        let completed = aggregate.complete_appraisal(ctx.actor_id, Utc::now())?.clone();
        let appraisal = repo::update_appraisal(&mut tx, &completed).await?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        log_transition(&loan, before);
        Ok(appraisal)
    }

    /// Append an approval decision and apply it to the loan
    pub async fn record_decision(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: ApprovalDecisionRequest,
    ) -> DomainResult<ApprovalDecision> {
        let request = &request;
        run_guarded("record_decision", ctx.timeout, move || {
            self.try_record_decision(ctx, id, request)
        })
        .await
    }

    async fn try_record_decision(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: &ApprovalDecisionRequest,
    ) -> DomainResult<ApprovalDecision> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let appraisal = repo::load_appraisal(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan).with_appraisal(appraisal);
        let before = aggregate.status();

        let recorded = aggregate
            .record_decision(request, ctx.actor_id, Utc::now())?
            .clone();
        let decision = repo::insert_decision(&mut tx, &recorded).await?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            decision = ?decision.decision,
            level = ?decision.level,
            approved_amount = ?loan.approved_amount,
            "Approval decision recorded"
        );
        log_transition(&loan, before);

        Ok(decision)
    }

    /// Open the loan's single disbursement in PENDING
    pub async fn create_disbursement(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: CreateDisbursementRequest,
    ) -> DomainResult<Disbursement> {
        let request = &request;
        run_guarded("create_disbursement", ctx.timeout, move || {
            self.try_create_disbursement(id, request)
        })
        .await
    }

    async fn try_create_disbursement(
        &self,
        id: Uuid,
        request: &CreateDisbursementRequest,
    ) -> DomainResult<Disbursement> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let decisions = repo::load_decisions(&mut tx, id).await?;
        let disbursement = repo::load_disbursement(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan)
            .with_decisions(decisions)
            .with_disbursement(disbursement);

        let created = aggregate.open_disbursement(request, Utc::now())?.clone();
        let disbursement = repo::insert_disbursement(&mut tx, &created).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %id,
            disbursement_id = %disbursement.id,
            amount = %disbursement.amount,
            method = ?disbursement.method,
            "Disbursement created"
        );

        Ok(disbursement)
    }

    /// PENDING -> PROCESSING
    pub async fn verify_disbursement(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: VerifyDisbursementRequest,
    ) -> DomainResult<Disbursement> {
        let request = &request;
        run_guarded("verify_disbursement", ctx.timeout, move || {
            self.try_verify_disbursement(ctx, id, request)
        })
        .await
    }

    async fn try_verify_disbursement(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: &VerifyDisbursementRequest,
    ) -> DomainResult<Disbursement> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let disbursement = repo::load_disbursement(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan).with_disbursement(disbursement);

        let verified = aggregate
            .verify_disbursement(request, ctx.actor_id, Utc::now())?
            .clone();
        let disbursement =
            repo::update_disbursement(&mut tx, &verified, DisbursementStatus::Pending).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %id,
            disbursement_id = %disbursement.id,
            verified_by = %ctx.actor_id,
            "Disbursement verified"
        );

        Ok(disbursement)
    }

    /// PROCESSING -> COMPLETED; the loan becomes DISBURSED and its schedule
    /// is written in the same transaction
    pub async fn complete_disbursement(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: CompleteDisbursementRequest,
    ) -> DomainResult<DisbursementCompletion> {
        let request = &request;
        run_guarded("complete_disbursement", ctx.timeout, move || {
            self.try_complete_disbursement(ctx, id, request)
        })
        .await
    }

    async fn try_complete_disbursement(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        request: &CompleteDisbursementRequest,
    ) -> DomainResult<DisbursementCompletion> {
        let mut tx = self.db_pool.begin().await?;

        let loan = repo::lock_loan(&mut tx, id).await?;
        let disbursement = repo::load_disbursement(&mut tx, id).await?;
        let schedule = repo::load_schedule(&mut tx, id).await?;
        let mut aggregate = LoanAggregate::new(loan)
            .with_disbursement(disbursement)
            .with_schedule(schedule);
        let before = aggregate.status();

        if let Err(err) = aggregate.complete_disbursement(request, ctx.actor_id, Utc::now()) {
            if matches!(err, DomainError::Invariant(_)) {
                tracing::error!(loan_id = %id, error = %err, "Disbursement completion hit a broken invariant");
            }
            return Err(err);
        }

        let completed = aggregate
            .disbursement
            .as_ref()
            .ok_or_else(|| DomainError::Invariant("completed disbursement vanished".to_string()))?;
        let disbursement =
            repo::update_disbursement(&mut tx, completed, DisbursementStatus::Processing).await?;
        repo::insert_schedule(&mut tx, &aggregate.schedule).await?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            reference = ?disbursement.reference_number,
            installments = aggregate.schedule.len(),
            "Disbursement completed and schedule generated"
        );
        log_transition(&loan, before);

        Ok(DisbursementCompletion {
            loan,
            disbursement,
            schedule: aggregate.schedule,
        })
    }

    /// DISBURSED -> ACTIVE
    pub async fn activate(&self, ctx: &RequestContext, id: Uuid) -> DomainResult<Loan> {
        run_guarded("activate_loan", ctx.timeout, move || self.try_activate(id)).await
    }

    async fn try_activate(&self, id: Uuid) -> DomainResult<Loan> {
        let mut tx = self.db_pool.begin().await?;

        let mut aggregate = LoanAggregate::new(repo::lock_loan(&mut tx, id).await?);
        let before = aggregate.status();
        aggregate.activate(Utc::now())?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        log_transition(&loan, before);
        Ok(loan)
    }

    /// ACTIVE or DISBURSED -> CLOSED with a final rating
    pub async fn close(&self, ctx: &RequestContext, id: Uuid, request: CloseLoanRequest) -> DomainResult<LoanClosure> {
        let request = &request;
        run_guarded("close_loan", ctx.timeout, move || self.try_close(id, request)).await
    }

    async fn try_close(&self, id: Uuid, request: &CloseLoanRequest) -> DomainResult<LoanClosure> {
        let mut tx = self.db_pool.begin().await?;

        let mut aggregate = LoanAggregate::new(repo::lock_loan(&mut tx, id).await?);
        let before = aggregate.status();
        aggregate.close(request, Utc::now())?;
        let loan = repo::update_state(&mut tx, &aggregate.loan, before).await?;

        tx.commit().await?;

        log_transition(&loan, before);

        Ok(LoanClosure {
            final_rating: loan.final_rating.clone().unwrap_or_default(),
            closure_notes: loan.closure_notes.clone(),
            closure_checklist: request.closure_checklist.clone().unwrap_or_default(),
            loan,
        })
    }
}

fn log_transition(loan: &Loan, from: LoanStatus) {
    tracing::info!(
        loan_id = %loan.id,
        loan_code = %loan.loan_id,
        from = %from,
        to = %loan.status,
        "Loan status changed"
    );
}
