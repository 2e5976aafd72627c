//! Cost request workflow service.
//!
//! Every mutating operation is a single read-modify-write: load the request,
//! compute the transition on a copy with [`CostApprovalEngine`], then persist it
//! through [`CostRequestStore::update`], which only applies when the stored
//! version is still the one that was read.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approvals::{actionable_status, CostApprovalEngine, CostEvent, CostTransition};
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{Permission, UserId};
use crate::domain::cost::{CostRequest, CostRequestId, CostStatus, NewCostRequest};
use crate::domain::ledger::{LedgerMatchKey, LedgerTransaction, NewLedgerTransaction};
use crate::errors::ApplicationError;
use crate::ledger::{self, SyncReport, SyncTrigger};

#[async_trait]
pub trait CostRequestStore: Send + Sync {
    async fn insert(&self, request: &CostRequest) -> Result<(), ApplicationError>;

    async fn find_by_id(&self, id: &CostRequestId)
        -> Result<Option<CostRequest>, ApplicationError>;

    /// Replaces the stored request only if its version still equals
    /// `expected_version`; otherwise fails with [`ApplicationError::Conflict`].
    async fn update(
        &self,
        request: &CostRequest,
        expected_version: u32,
    ) -> Result<(), ApplicationError>;

    /// Oldest first.
    async fn list_by_status(&self, status: CostStatus)
        -> Result<Vec<CostRequest>, ApplicationError>;

    /// Newest first.
    async fn list_by_creator(&self, creator: &UserId)
        -> Result<Vec<CostRequest>, ApplicationError>;

    /// Newest first.
    async fn list_all(&self) -> Result<Vec<CostRequest>, ApplicationError>;

    /// APPROVED_FINAL requests carrying a non-empty check number.
    async fn list_check_numbered_final(&self) -> Result<Vec<CostRequest>, ApplicationError>;
}

/// Append-only view of the bookkeeping ledger.
#[async_trait]
pub trait LedgerBook: Send + Sync {
    async fn find_transaction(
        &self,
        key: &LedgerMatchKey,
    ) -> Result<Option<LedgerTransaction>, ApplicationError>;

    async fn create_transaction(
        &self,
        entry: NewLedgerTransaction,
    ) -> Result<LedgerTransaction, ApplicationError>;

    /// Creates `entry` unless a transaction matching `key` exists. Returns
    /// `None` when skipped. Implementations backed by a shared store should
    /// override this with an atomic conditional insert.
    async fn create_if_absent(
        &self,
        key: &LedgerMatchKey,
        entry: NewLedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, ApplicationError> {
        if self.find_transaction(key).await?.is_some() {
            return Ok(None);
        }
        self.create_transaction(entry).await.map(Some)
    }
}

/// Who is calling and under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: UserId,
    pub correlation_id: String,
}

impl ActorContext {
    pub fn new(actor_id: UserId, correlation_id: impl Into<String>) -> Self {
        Self { actor_id, correlation_id: correlation_id.into() }
    }
}

#[derive(Clone)]
pub struct CostWorkflow {
    store: Arc<dyn CostRequestStore>,
    ledger: Arc<dyn LedgerBook>,
    audit: Arc<dyn AuditSink>,
    engine: CostApprovalEngine,
}

impl CostWorkflow {
    pub fn new(
        store: Arc<dyn CostRequestStore>,
        ledger: Arc<dyn LedgerBook>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, ledger, audit, engine: CostApprovalEngine::new() }
    }

    pub async fn create(
        &self,
        ctx: &ActorContext,
        fields: NewCostRequest,
    ) -> Result<CostRequest, ApplicationError> {
        fields.validate()?;
        let request = CostRequest::open(fields, ctx.actor_id.clone(), Utc::now());
        self.store.insert(&request).await?;

        info!(
            event_name = "cost.request.created",
            correlation_id = %ctx.correlation_id,
            cost_request_id = %request.id,
            actor = %ctx.actor_id,
            amount = %request.amount,
            "cost request submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                ctx.correlation_id.clone(),
                "cost.created",
                AuditCategory::Workflow,
                ctx.actor_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("amount", request.amount.to_string())
            .with_metadata("attachments", request.attachments.len().to_string()),
        );

        Ok(request)
    }

    pub async fn get(&self, id: &CostRequestId) -> Result<CostRequest, ApplicationError> {
        self.load(id).await
    }

    pub async fn list_mine(&self, actor_id: &UserId) -> Result<Vec<CostRequest>, ApplicationError> {
        self.store.list_by_creator(actor_id).await
    }

    pub async fn list_all(&self) -> Result<Vec<CostRequest>, ApplicationError> {
        self.store.list_all().await
    }

    /// Requests waiting at any gate the permissions can act on.
    ///
    /// Buckets are fetched FINAL, L2, L1, each oldest first, then merged with
    /// the first occurrence of an id kept.
    pub async fn list_pending_approvals(
        &self,
        permissions: &BTreeSet<Permission>,
    ) -> Result<Vec<CostRequest>, ApplicationError> {
        let mut merged = Vec::new();
        for permission in
            [Permission::ApproveCostFinal, Permission::ApproveCostL2, Permission::ApproveCostL1]
        {
            if !permissions.contains(&permission) {
                continue;
            }
            let Some(status) = actionable_status(permission) else {
                continue;
            };
            merged.extend(self.store.list_by_status(status).await?);
        }

        let mut seen = HashSet::new();
        merged.retain(|request| seen.insert(request.id.clone()));
        Ok(merged)
    }

    pub async fn approve(
        &self,
        id: &CostRequestId,
        ctx: &ActorContext,
        permissions: &BTreeSet<Permission>,
        comment: Option<String>,
    ) -> Result<CostRequest, ApplicationError> {
        let current = self.load(id).await?;
        let transition =
            match self.engine.approve(&current, &ctx.actor_id, permissions, comment, Utc::now()) {
                Ok(transition) => transition,
                Err(error) => {
                    warn!(
                        event_name = "cost.request.approval_denied",
                        correlation_id = %ctx.correlation_id,
                        cost_request_id = %id,
                        actor = %ctx.actor_id,
                        status = %current.status,
                        error = %error,
                        "approval attempt matched no rule"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            Some(id.clone()),
                            ctx.correlation_id.clone(),
                            "cost.approval_rejected",
                            AuditCategory::Workflow,
                            ctx.actor_id.0.clone(),
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("status", current.status.as_str())
                        .with_metadata("error", error.to_string()),
                    );
                    return Err(error.into());
                }
            };

        self.commit(ctx, transition).await
    }

    /// Rejection is unconditional, see [`CostApprovalEngine::reject`].
    pub async fn reject(
        &self,
        id: &CostRequestId,
        ctx: &ActorContext,
        reason: impl Into<String>,
    ) -> Result<CostRequest, ApplicationError> {
        let current = self.load(id).await?;
        let transition = self.engine.reject(&current, &ctx.actor_id, reason, Utc::now());
        self.commit(ctx, transition).await
    }

    /// Records the check number, then mirrors the request into the ledger once.
    ///
    /// The check number is the committed change. A failed ledger write is
    /// logged and audited as `ledger.sync_deferred`; the next sweep creates
    /// the entry.
    pub async fn add_check_number(
        &self,
        id: &CostRequestId,
        ctx: &ActorContext,
        check_number: &str,
    ) -> Result<CostRequest, ApplicationError> {
        let current = self.load(id).await?;
        let transition = self.engine.record_check_number(&current, check_number, Utc::now())?;
        let request = self.commit(ctx, transition).await?;

        if let Err(error) = self.sync_one(&request, ctx, SyncTrigger::CheckRecorded).await {
            warn!(
                event_name = "ledger.sync.deferred",
                correlation_id = %ctx.correlation_id,
                cost_request_id = %request.id,
                error = %error,
                "check number recorded but ledger write failed; next sweep will retry"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    ctx.correlation_id.clone(),
                    "ledger.sync_deferred",
                    AuditCategory::Ledger,
                    ctx.actor_id.0.clone(),
                    AuditOutcome::Failed,
                )
                .with_metadata("trigger", SyncTrigger::CheckRecorded.as_str())
                .with_metadata("error", error.to_string()),
            );
        }
        Ok(request)
    }

    /// Reconciliation sweep. Individual failures are logged and counted, never
    /// raised; only a failed scan is an error.
    pub async fn sync_approved_to_ledger(
        &self,
        ctx: &ActorContext,
    ) -> Result<SyncReport, ApplicationError> {
        let candidates = self.store.list_check_numbered_final().await?;
        let mut report = SyncReport::default();

        for request in &candidates {
            match self.sync_one(request, ctx, SyncTrigger::Sweep).await {
                Ok(true) => report.synced_count += 1,
                Ok(false) => report.skipped_count += 1,
                Err(error) => {
                    report.failed_count += 1;
                    warn!(
                        event_name = "ledger.sweep.item_failed",
                        correlation_id = %ctx.correlation_id,
                        cost_request_id = %request.id,
                        error = %error,
                        "ledger sync failed for cost request; next sweep will retry"
                    );
                }
            }
        }

        info!(
            event_name = "ledger.sweep.completed",
            correlation_id = %ctx.correlation_id,
            actor = %ctx.actor_id,
            scanned = candidates.len(),
            synced = report.synced_count,
            skipped = report.skipped_count,
            failed = report.failed_count,
            "ledger reconciliation sweep finished"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                ctx.correlation_id.clone(),
                "ledger.sweep_completed",
                AuditCategory::Ledger,
                ctx.actor_id.0.clone(),
                if report.failed_count == 0 { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("synced", report.synced_count.to_string())
            .with_metadata("skipped", report.skipped_count.to_string())
            .with_metadata("failed", report.failed_count.to_string()),
        );

        Ok(report)
    }

    async fn load(&self, id: &CostRequestId) -> Result<CostRequest, ApplicationError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::cost_request_not_found(id.0.clone()))
    }

    async fn commit(
        &self,
        ctx: &ActorContext,
        transition: CostTransition,
    ) -> Result<CostRequest, ApplicationError> {
        self.store.update(&transition.request, transition.expected_version).await?;

        let event_type = match transition.event {
            CostEvent::Approved { .. } => "cost.approved",
            CostEvent::Rejected => "cost.rejected",
            CostEvent::CheckRecorded => "cost.check_recorded",
        };
        info!(
            event_name = event_type,
            correlation_id = %ctx.correlation_id,
            cost_request_id = %transition.request.id,
            actor = %ctx.actor_id,
            from = %transition.from,
            to = %transition.to,
            version = transition.request.version,
            "cost request transition applied"
        );

        let mut event = AuditEvent::new(
            Some(transition.request.id.clone()),
            ctx.correlation_id.clone(),
            event_type,
            AuditCategory::Workflow,
            ctx.actor_id.0.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("from", transition.from.as_str())
        .with_metadata("to", transition.to.as_str());
        if let CostEvent::Approved { gate } = transition.event {
            event = event.with_metadata("gate", gate.as_str());
        }
        self.audit.emit(event);

        Ok(transition.request)
    }

    /// Returns whether a new ledger transaction was created.
    async fn sync_one(
        &self,
        request: &CostRequest,
        ctx: &ActorContext,
        trigger: SyncTrigger,
    ) -> Result<bool, ApplicationError> {
        let key = ledger::match_key(request);
        let entry = ledger::ledger_entry(request, &ctx.actor_id, trigger, Utc::now());
        let created = self.ledger.create_if_absent(&key, entry).await?;

        let (event_type, outcome) = match &created {
            Some(transaction) => {
                info!(
                    event_name = "ledger.transaction.created",
                    correlation_id = %ctx.correlation_id,
                    cost_request_id = %request.id,
                    ledger_transaction_id = %transaction.id.0,
                    trigger = trigger.as_str(),
                    amount = %request.amount,
                    "cost request mirrored into ledger"
                );
                ("ledger.synced", AuditOutcome::Success)
            }
            None => ("ledger.sync_skipped", AuditOutcome::Success),
        };
        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                ctx.correlation_id.clone(),
                event_type,
                AuditCategory::Ledger,
                ctx.actor_id.0.clone(),
                outcome,
            )
            .with_metadata("trigger", trigger.as_str())
            .with_metadata("title", key.title),
        );

        Ok(created.is_some())
    }
}
