//! Sync orchestrator: the per-request reconciliation state machine.
//!
//! Every logical write runs one sequential pipeline:
//!
//! `RelationalWrite → LedgerGate → LedgerWrite → AuditWrite`
//!
//! The relational write is mandatory and first; if it fails the whole
//! request fails and the ledger is never touched. Every ledger-side
//! problem after that degrades to a partial outcome — the relational
//! store is the operational source of truth and is never rolled back to
//! compensate for the audit overlay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;

use scrumsync_stores::{
    AuditLog, AuditOutcome, EntityKind, Fingerprint, LedgerError, LedgerGateway, LedgerRef,
    LocalId, Receipt, RelationalStore, StoredEntity, SubmissionHandle,
};

use crate::domain::entity::entity_label;
use crate::domain::error::{LedgerMiss, Result, SyncError};
use crate::domain::status::ledger_status_code;
use crate::fingerprint::fingerprint_of;
use crate::obs::{
    emit_ledger_confirmed, emit_ledger_failed, emit_ledger_submitted, emit_link_persist_failed,
    emit_relational_written, SyncSpan,
};
use crate::recorder::{AuditRecorder, LedgerAttempt};
use crate::resolver::{MappingConfidence, MappingResolver};
use crate::sync_state::{sync_state_of, SyncState};

/// Retry/backoff policy for the `LedgerWrite` step.
///
/// Only `Unavailable` is retried; a decline or revert is terminal on the
/// first occurrence. Backoff is linear in the attempt number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all; the first failure is terminal.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// What one pipeline run did.
#[derive(Debug)]
pub struct SyncReport {
    /// The entity as of the end of the pipeline. For removals this is
    /// the pre-delete snapshot.
    pub entity: StoredEntity,
    pub sync_state: SyncState,
    /// Confirmation receipt when a ledger write landed.
    pub receipt: Option<Receipt>,
    /// Whether the audit record landed; `None` when no ledger operation
    /// was attempted at all.
    pub audit_recorded: Option<bool>,
}

/// Terminal pipeline outcome. Exactly one of success, partial, or a
/// fatal [`SyncError`] — nothing crosses the orchestrator unclassified.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Relational and ledger agree (or the ledger write was provably
    /// unnecessary).
    Success(SyncReport),
    /// The relational write stands but the ledger leg did not land;
    /// `reason` says why and what the caller can do about it.
    Partial { report: SyncReport, reason: LedgerMiss },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success(_))
    }

    pub fn report(&self) -> &SyncReport {
        match self {
            SyncOutcome::Success(report) => report,
            SyncOutcome::Partial { report, .. } => report,
        }
    }

    pub fn partial_reason(&self) -> Option<&LedgerMiss> {
        match self {
            SyncOutcome::Success(_) => None,
            SyncOutcome::Partial { reason, .. } => Some(reason),
        }
    }
}

/// The ledger operation a pipeline wants to perform.
enum LedgerOp {
    Register {
        parent: Option<LedgerRef>,
        payload: Value,
    },
    UpdateFingerprint {
        entity: LedgerRef,
    },
    ChangeStatus {
        entity: LedgerRef,
        code: u8,
    },
    Remove {
        entity: LedgerRef,
    },
}

impl LedgerOp {
    fn method(&self) -> &'static str {
        match self {
            LedgerOp::Register { .. } => "register",
            LedgerOp::UpdateFingerprint { .. } => "update_fingerprint",
            LedgerOp::ChangeStatus { .. } => "change_status",
            LedgerOp::Remove { .. } => "remove",
        }
    }
}

/// The reconciliation engine. Owns no global state: every collaborator
/// is an explicitly constructed, passed-in trait object, which also
/// keeps the gateway mockable in tests.
pub struct SyncOrchestrator {
    relational: Arc<dyn RelationalStore>,
    ledger: Arc<dyn LedgerGateway>,
    resolver: MappingResolver,
    recorder: AuditRecorder,
    default_retry: RetryPolicy,
    retry_overrides: HashMap<EntityKind, RetryPolicy>,
}

impl SyncOrchestrator {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        ledger: Arc<dyn LedgerGateway>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let resolver = MappingResolver::new(relational.clone(), ledger.clone(), audit.clone());
        let recorder = AuditRecorder::new(audit);
        Self {
            relational,
            ledger,
            resolver,
            recorder,
            default_retry: RetryPolicy::default(),
            retry_overrides: HashMap::new(),
        }
    }

    /// Replace the default retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Override the retry policy for one entity kind.
    pub fn with_kind_retry_policy(mut self, kind: EntityKind, policy: RetryPolicy) -> Self {
        self.retry_overrides.insert(kind, policy);
        self
    }

    /// The resolver, for callers that need pure mapping resolution.
    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    fn retry_for(&self, kind: EntityKind) -> &RetryPolicy {
        self.retry_overrides.get(&kind).unwrap_or(&self.default_retry)
    }

    // -- pipelines ----------------------------------------------------------

    /// Create an entity: relational insert, then ledger `register`.
    ///
    /// Teams register with no parent; children require the owning team
    /// to be synchronized first.
    pub async fn create(
        &self,
        kind: EntityKind,
        team_id: Option<LocalId>,
        fields: Value,
    ) -> Result<SyncOutcome> {
        let _span = SyncSpan::enter("create", kind, None);

        let row = self.relational.insert(kind, team_id, fields).await?;
        emit_relational_written("create", kind, row.local_id);
        let fp = fingerprint_of(&row)?;

        let parent = match self.team_gate(&row).await? {
            Err(reason) => return self.partial(row, reason, None),
            Ok(parent) => parent,
        };

        let op = LedgerOp::Register {
            parent,
            payload: row.fields.clone(),
        };
        self.run_ledger_leg(row, fp, op, true).await
    }

    /// Update an entity's business fields: relational update, then
    /// ledger `update_fingerprint`.
    pub async fn update(&self, kind: EntityKind, id: LocalId, fields: Value) -> Result<SyncOutcome> {
        let _span = SyncSpan::enter("update", kind, Some(id));

        let mut row = self.relational.update(kind, id, fields).await?;
        emit_relational_written("update", kind, id);
        let fp = fingerprint_of(&row)?;

        // Idempotency short-circuit: the ledger already holds exactly
        // this fingerprint.
        if row.ledger_fingerprint == Some(fp) {
            return self.success(row, None, None);
        }

        let parent = match self.team_gate(&row).await? {
            Err(reason) => return self.partial(row, reason, None),
            Ok(parent) => parent,
        };

        match self.resolver.resolve(&row, parent.as_ref()).await? {
            None => {
                let reason = LedgerMiss::MappingNotFound { kind, id };
                self.partial(row, reason, None)
            }
            Some(resolved) if resolved.confidence == MappingConfidence::Replay => {
                // A replay hit means the on-ledger fingerprint already
                // equals the current one; persist the link and stop.
                self.persist_link(&mut row, &resolved.ledger_ref, fp).await;
                self.success(row, None, None)
            }
            Some(resolved) => {
                let op = LedgerOp::UpdateFingerprint {
                    entity: resolved.ledger_ref,
                };
                self.run_ledger_leg(row, fp, op, true).await
            }
        }
    }

    /// Transition an entity's status: relational update of the `status`
    /// field, then ledger `change_status` with the kind's fixed code.
    pub async fn change_status(
        &self,
        kind: EntityKind,
        id: LocalId,
        label: &str,
    ) -> Result<SyncOutcome> {
        // Unknown labels fail before any write.
        let code = ledger_status_code(kind, label)?;

        let _span = SyncSpan::enter("change_status", kind, Some(id));

        let current = self.relational.fetch(kind, id).await?;
        let mut fields = current.fields;
        match fields.as_object_mut() {
            Some(obj) => {
                obj.insert("status".to_string(), Value::String(label.to_string()));
            }
            None => {
                return Err(SyncError::Canonical(
                    "entity fields are not a JSON object".to_string(),
                ))
            }
        }
        let row = self.relational.update(kind, id, fields).await?;
        emit_relational_written("change_status", kind, id);
        let fp = fingerprint_of(&row)?;

        let parent = match self.team_gate(&row).await? {
            Err(reason) => return self.partial(row, reason, None),
            Ok(parent) => parent,
        };

        // No fingerprint short-circuit here: the status code must ship
        // even when the tracked fields hash identically (team status is
        // untracked).
        match self.resolver.resolve(&row, parent.as_ref()).await? {
            None => {
                let reason = LedgerMiss::MappingNotFound { kind, id };
                self.partial(row, reason, None)
            }
            Some(resolved) => {
                let op = LedgerOp::ChangeStatus {
                    entity: resolved.ledger_ref,
                    code,
                };
                self.run_ledger_leg(row, fp, op, true).await
            }
        }
    }

    /// Remove an entity: tombstoning relational delete, then best-effort
    /// ledger `remove`. The relational delete is authoritative even when
    /// the ledger step fails.
    pub async fn remove(&self, kind: EntityKind, id: LocalId) -> Result<SyncOutcome> {
        let _span = SyncSpan::enter("remove", kind, Some(id));

        let snapshot = self.relational.fetch(kind, id).await?;
        self.relational.delete(kind, id).await?;
        emit_relational_written("remove", kind, id);
        let fp = fingerprint_of(&snapshot)?;

        let parent = match self.team_gate(&snapshot).await? {
            Err(reason) => return self.partial(snapshot, reason, None),
            Ok(parent) => parent,
        };

        match self.resolver.resolve(&snapshot, parent.as_ref()).await? {
            // A positional guess must not pick what gets removed from
            // the ledger.
            None => {
                let reason = LedgerMiss::MappingNotFound { kind, id };
                self.partial(snapshot, reason, None)
            }
            Some(resolved) if resolved.confidence == MappingConfidence::Heuristic => {
                let reason = LedgerMiss::MappingNotFound { kind, id };
                self.partial(snapshot, reason, None)
            }
            Some(resolved) => {
                let op = LedgerOp::Remove {
                    entity: resolved.ledger_ref,
                };
                self.run_ledger_leg(snapshot, fp, op, false).await
            }
        }
    }

    /// Re-run the ledger leg for an `Unsynced` or `Drifted` entity
    /// without a new relational business write — the "retry later
    /// without re-entering data" flow.
    pub async fn sync(&self, kind: EntityKind, id: LocalId) -> Result<SyncOutcome> {
        let _span = SyncSpan::enter("sync", kind, Some(id));

        let mut row = self.relational.fetch(kind, id).await?;
        let fp = fingerprint_of(&row)?;
        if sync_state_of(&row)? == SyncState::Synced {
            return self.success(row, None, None);
        }

        let parent = match self.team_gate(&row).await? {
            Err(reason) => return self.partial(row, reason, None),
            Ok(parent) => parent,
        };

        match self.resolver.resolve(&row, parent.as_ref()).await? {
            Some(resolved) if resolved.confidence == MappingConfidence::Replay => {
                self.persist_link(&mut row, &resolved.ledger_ref, fp).await;
                self.success(row, None, None)
            }
            Some(resolved) => {
                let op = LedgerOp::UpdateFingerprint {
                    entity: resolved.ledger_ref,
                };
                self.run_ledger_leg(row, fp, op, true).await
            }
            // No counterpart anywhere: this entity has never been
            // registered, so register it now.
            None => {
                let op = LedgerOp::Register {
                    parent,
                    payload: row.fields.clone(),
                };
                self.run_ledger_leg(row, fp, op, true).await
            }
        }
    }

    /// Bulk pass: one [`Self::sync`] pipeline per non-synced entity of
    /// the kind in the team, issued concurrently. No ordering guarantee
    /// across entities; within one entity the caller serializes.
    pub async fn sync_all(
        &self,
        kind: EntityKind,
        team_id: LocalId,
    ) -> Result<Vec<(LocalId, Result<SyncOutcome>)>> {
        let rows = self.relational.list(kind, Some(team_id)).await?;
        let mut pending = Vec::new();
        for row in &rows {
            if sync_state_of(row)? != SyncState::Synced {
                pending.push(row.local_id);
            }
        }

        let pipelines = pending
            .into_iter()
            .map(|id| async move { (id, self.sync(kind, id).await) });
        Ok(join_all(pipelines).await)
    }

    // -- shared steps -------------------------------------------------------

    /// `LedgerGate`, team half: children need a synchronized owning team
    /// before any ledger write. Returns the parent ref to use
    /// (`None` for teams themselves) or the blocking reason.
    async fn team_gate(
        &self,
        row: &StoredEntity,
    ) -> Result<std::result::Result<Option<LedgerRef>, LedgerMiss>> {
        if row.kind == EntityKind::Team {
            return Ok(Ok(None));
        }
        let Some(team_id) = row.team_id else {
            return Err(SyncError::InvalidEntity {
                kind: row.kind,
                reason: "missing owning team".to_string(),
            });
        };
        let team = self.relational.fetch(EntityKind::Team, team_id).await?;
        Ok(match team.ledger_ref {
            Some(team_ref) => Ok(Some(team_ref)),
            None => Err(LedgerMiss::TeamNotSynced { team: team_id }),
        })
    }

    /// `LedgerWrite` + `AuditWrite`: submit with bounded retry, await
    /// confirmation, persist bookkeeping, record the attempt.
    async fn run_ledger_leg(
        &self,
        mut row: StoredEntity,
        fp: Fingerprint,
        op: LedgerOp,
        link_on_confirm: bool,
    ) -> Result<SyncOutcome> {
        let (handle, result) = self.ledger_write(row.kind, row.local_id, fp, &op).await;
        let recorded = self
            .record_attempt(&row, op.method(), handle, &result)
            .await;

        match result {
            Ok(receipt) => {
                if link_on_confirm {
                    self.persist_link(&mut row, &receipt.confirmed_ref, fp).await;
                }
                self.success(row, Some(receipt), Some(recorded))
            }
            Err(err) => self.partial(row, err.into(), Some(recorded)),
        }
    }

    /// Submit one ledger operation and await confirmation, retrying
    /// `Unavailable` under the kind's policy. Declines and reverts are
    /// terminal on first occurrence.
    async fn ledger_write(
        &self,
        kind: EntityKind,
        id: LocalId,
        fp: Fingerprint,
        op: &LedgerOp,
    ) -> (SubmissionHandle, std::result::Result<Receipt, LedgerError>) {
        let policy = self.retry_for(kind);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let submitted = match op {
                LedgerOp::Register { parent, payload } => {
                    self.ledger
                        .register(kind, parent.as_ref(), payload.clone(), &fp)
                        .await
                }
                LedgerOp::UpdateFingerprint { entity } => {
                    self.ledger.update_fingerprint(kind, entity, &fp).await
                }
                LedgerOp::ChangeStatus { entity, code } => {
                    self.ledger.change_status(kind, entity, *code).await
                }
                LedgerOp::Remove { entity } => self.ledger.remove(kind, entity).await,
            };

            let pending = match submitted {
                Ok(pending) => pending,
                Err(err @ LedgerError::Unavailable(_)) if attempt < policy.max_attempts => {
                    emit_ledger_failed(kind, id, op.method(), &err);
                    tokio::time::sleep(policy.backoff * attempt).await;
                    continue;
                }
                Err(err) => {
                    emit_ledger_failed(kind, id, op.method(), &err);
                    // Never submitted; generate a local handle so the
                    // audit record still has a correlation id.
                    return (SubmissionHandle::generate(), Err(err));
                }
            };

            emit_ledger_submitted(kind, id, op.method(), pending.handle());
            let (handle, outcome) = pending.settle().await;
            match outcome {
                Ok(receipt) => {
                    emit_ledger_confirmed(kind, id, op.method(), receipt.block, receipt.cost);
                    return (handle, Ok(receipt));
                }
                Err(err @ LedgerError::Unavailable(_)) if attempt < policy.max_attempts => {
                    emit_ledger_failed(kind, id, op.method(), &err);
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
                Err(err) => {
                    emit_ledger_failed(kind, id, op.method(), &err);
                    return (handle, Err(err));
                }
            }
        }
    }

    /// Persist the confirmed link and fingerprint. Failure here is
    /// recoverable by a later resolver pass, so it downgrades to a
    /// warning instead of overturning a confirmed ledger write.
    async fn persist_link(&self, row: &mut StoredEntity, ledger_ref: &LedgerRef, fp: Fingerprint) {
        match self
            .relational
            .record_ledger_link(row.kind, row.local_id, ledger_ref, &fp)
            .await
        {
            Ok(()) => {
                row.ledger_ref = Some(ledger_ref.clone());
                row.ledger_fingerprint = Some(fp);
            }
            Err(err) => emit_link_persist_failed(row.kind, row.local_id, &err),
        }
    }

    async fn record_attempt(
        &self,
        row: &StoredEntity,
        method: &'static str,
        handle: SubmissionHandle,
        result: &std::result::Result<Receipt, LedgerError>,
    ) -> bool {
        let (outcome, receipt) = match result {
            Ok(receipt) => (AuditOutcome::Confirmed, Some(receipt)),
            Err(LedgerError::Declined) => (AuditOutcome::Declined, None),
            Err(LedgerError::Unavailable(_)) => (AuditOutcome::Unavailable, None),
            Err(LedgerError::Reverted { .. }) => (AuditOutcome::Reverted, None),
        };
        let label = entity_label(&row.fields);
        self.recorder
            .record(LedgerAttempt {
                kind: row.kind,
                local_id: row.local_id,
                team_id: row.team_id,
                method,
                handle,
                outcome,
                receipt,
                label: &label,
            })
            .await
    }

    fn success(
        &self,
        row: StoredEntity,
        receipt: Option<Receipt>,
        audit_recorded: Option<bool>,
    ) -> Result<SyncOutcome> {
        let sync_state = sync_state_of(&row)?;
        Ok(SyncOutcome::Success(SyncReport {
            entity: row,
            sync_state,
            receipt,
            audit_recorded,
        }))
    }

    fn partial(
        &self,
        row: StoredEntity,
        reason: LedgerMiss,
        audit_recorded: Option<bool>,
    ) -> Result<SyncOutcome> {
        let sync_state = sync_state_of(&row)?;
        Ok(SyncOutcome::Partial {
            report: SyncReport {
                entity: row,
                sync_state,
                receipt: None,
                audit_recorded,
            },
            reason,
        })
    }
}
