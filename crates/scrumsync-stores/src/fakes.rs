//! In-memory fakes for the store traits (testing only).
//!
//! `MemoryRelationalStore`, `MemoryLedger`, and `MemoryAuditLog` satisfy
//! the trait contracts without any external service. The ledger fake is
//! scriptable: failure modes can be queued per submission and the whole
//! ledger can be taken offline, so orchestrator and resolver tests can
//! exercise every degradation path.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::audit::{AuditFilter, AuditLog, AuditPage, AuditRecord};
use crate::error::{LedgerError, LedgerResult, StoreError, StoreResult};
use crate::ledger::LedgerGateway;
use crate::relational::RelationalStore;
use crate::types::{
    EntityKind, Fingerprint, LedgerEntry, LedgerRef, LocalId, PendingOp, Receipt, StoredEntity,
    SubmissionHandle,
};

// ---------------------------------------------------------------------------
// MemoryRelationalStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RelationalInner {
    rows: HashMap<(EntityKind, i64), StoredEntity>,
    next_id: i64,
    failures: VecDeque<StoreError>,
}

/// In-memory relational store backed by a `HashMap<(kind, id), row>`.
#[derive(Debug, Default)]
pub struct MemoryRelationalStore {
    inner: Mutex<RelationalInner>,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next store operation.
    pub fn queue_failure(&self, err: StoreError) {
        self.inner.lock().unwrap().failures.push_back(err);
    }

    fn take_failure(inner: &mut RelationalInner) -> StoreResult<()> {
        match inner.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn insert(
        &self,
        kind: EntityKind,
        team_id: Option<LocalId>,
        fields: Value,
    ) -> StoreResult<StoredEntity> {
        let mut inner = self.inner.lock().unwrap();
        Self::take_failure(&mut inner)?;

        if kind != EntityKind::Team && team_id.is_none() {
            return Err(StoreError::Rejected {
                message: format!("{kind} requires an owning team"),
            });
        }

        inner.next_id += 1;
        let row = StoredEntity {
            kind,
            local_id: LocalId(inner.next_id),
            team_id,
            fields,
            ledger_ref: None,
            ledger_fingerprint: None,
            created_at: Utc::now(),
        };
        inner.rows.insert((kind, row.local_id.0), row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: LocalId,
        fields: Value,
    ) -> StoreResult<StoredEntity> {
        let mut inner = self.inner.lock().unwrap();
        Self::take_failure(&mut inner)?;

        let row = inner
            .rows
            .get_mut(&(kind, id.0))
            .ok_or(StoreError::NotFound { kind, id })?;
        row.fields = fields;
        Ok(row.clone())
    }

    async fn delete(&self, kind: EntityKind, id: LocalId) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::take_failure(&mut inner)?;

        inner
            .rows
            .remove(&(kind, id.0))
            .map(|_| ())
            .ok_or(StoreError::NotFound { kind, id })
    }

    async fn fetch(&self, kind: EntityKind, id: LocalId) -> StoreResult<StoredEntity> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .get(&(kind, id.0))
            .cloned()
            .ok_or(StoreError::NotFound { kind, id })
    }

    async fn list(
        &self,
        kind: EntityKind,
        team_id: Option<LocalId>,
    ) -> StoreResult<Vec<StoredEntity>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<StoredEntity> = inner
            .rows
            .values()
            .filter(|r| r.kind == kind)
            .filter(|r| team_id.map_or(true, |t| r.team_id == Some(t)))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.local_id));
        Ok(rows)
    }

    async fn record_ledger_link(
        &self,
        kind: EntityKind,
        id: LocalId,
        ledger_ref: &LedgerRef,
        fingerprint: &Fingerprint,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::take_failure(&mut inner)?;

        let row = inner
            .rows
            .get_mut(&(kind, id.0))
            .ok_or(StoreError::NotFound { kind, id })?;

        match &row.ledger_ref {
            Some(existing) if existing != ledger_ref => {
                Err(StoreError::LedgerRefConflict { kind, id })
            }
            _ => {
                row.ledger_ref = Some(ledger_ref.clone());
                row.ledger_fingerprint = Some(*fingerprint);
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// Failure injected into the next state-changing submission.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// The signer refuses authorization; surfaces on confirmation.
    Decline,
    /// Network outage; surfaces on submission.
    Unavailable,
    /// Ledger business rule; surfaces on confirmation with this reason.
    Revert(String),
}

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub kind: EntityKind,
    pub method: String,
    pub entity: Option<LedgerRef>,
}

#[derive(Debug)]
struct FakeEntry {
    ledger_ref: LedgerRef,
    parent: Option<LedgerRef>,
    fingerprint: Option<Fingerprint>,
    status: u8,
    removed: bool,
}

#[derive(Debug, Default)]
struct LedgerInner {
    registries: HashMap<EntityKind, Vec<FakeEntry>>,
    next_ref: u64,
    next_block: u64,
    failures: VecDeque<ScriptedFailure>,
    calls: Vec<GatewayCall>,
    offline: bool,
    serve_fingerprints: bool,
}

/// In-memory ledger: monotonic refs per instance, immediate
/// confirmations, scriptable failures, full call recording.
#[derive(Debug)]
pub struct MemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        MemoryLedger {
            inner: Mutex::new(LedgerInner {
                serve_fingerprints: true,
                next_block: 1000,
                ..LedgerInner::default()
            }),
        }
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next state-changing submission.
    pub fn script_failure(&self, failure: ScriptedFailure) {
        self.inner.lock().unwrap().failures.push_back(failure);
    }

    /// Take the whole ledger offline: every call, reads included,
    /// fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// When false, `team_members` stops serving fingerprints, as for
    /// contracts that predate fingerprint tracking.
    pub fn set_serve_fingerprints(&self, serve: bool) {
        self.inner.lock().unwrap().serve_fingerprints = serve;
    }

    /// Seed an on-ledger entity directly, bypassing the gateway — for
    /// tests that model state created by other clients or before
    /// fingerprint tracking existed.
    pub fn seed_entry(
        &self,
        kind: EntityKind,
        parent: Option<&LedgerRef>,
        fingerprint: Option<Fingerprint>,
    ) -> LedgerRef {
        let mut inner = self.inner.lock().unwrap();
        inner.next_ref += 1;
        let ledger_ref = LedgerRef::from(inner.next_ref.to_string());
        inner.registries.entry(kind).or_default().push(FakeEntry {
            ledger_ref: ledger_ref.clone(),
            parent: parent.cloned(),
            fingerprint,
            status: 0,
            removed: false,
        });
        ledger_ref
    }

    /// All recorded calls, reads included.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// State-changing submissions only.
    pub fn submissions(&self) -> Vec<GatewayCall> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.method != "team_members")
            .cloned()
            .collect()
    }

    /// Current status code of a seeded/registered entity.
    pub fn status_of(&self, kind: EntityKind, entity: &LedgerRef) -> Option<u8> {
        let inner = self.inner.lock().unwrap();
        inner
            .registries
            .get(&kind)?
            .iter()
            .find(|e| &e.ledger_ref == entity)
            .map(|e| e.status)
    }

    /// Whether an entity has been removed from its registry.
    pub fn is_removed(&self, kind: EntityKind, entity: &LedgerRef) -> Option<bool> {
        let inner = self.inner.lock().unwrap();
        inner
            .registries
            .get(&kind)?
            .iter()
            .find(|e| &e.ledger_ref == entity)
            .map(|e| e.removed)
    }

    fn record_call(inner: &mut LedgerInner, kind: EntityKind, method: &str, entity: Option<&LedgerRef>) {
        inner.calls.push(GatewayCall {
            kind,
            method: method.to_string(),
            entity: entity.cloned(),
        });
    }

    /// Shared submission preamble: offline check, then scripted-failure
    /// dispatch. Returns `Some(op)` when a scripted failure consumed the
    /// submission.
    fn scripted_outcome(inner: &mut LedgerInner) -> LedgerResult<Option<PendingOp>> {
        if inner.offline {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        match inner.failures.pop_front() {
            None => Ok(None),
            Some(ScriptedFailure::Unavailable) => Err(LedgerError::Unavailable(
                "scripted network outage".to_string(),
            )),
            Some(ScriptedFailure::Decline) => Ok(Some(PendingOp::ready(
                SubmissionHandle::generate(),
                Err(LedgerError::Declined),
            ))),
            Some(ScriptedFailure::Revert(reason)) => Ok(Some(PendingOp::ready(
                SubmissionHandle::generate(),
                Err(LedgerError::Reverted { reason }),
            ))),
        }
    }

    fn confirm_receipt(inner: &mut LedgerInner, confirmed_ref: LedgerRef) -> PendingOp {
        inner.next_block += 1;
        PendingOp::ready(
            SubmissionHandle::generate(),
            Ok(Receipt {
                confirmed_ref,
                block: inner.next_block,
                cost: 21,
            }),
        )
    }

    fn entry_mut<'a>(
        inner: &'a mut LedgerInner,
        kind: EntityKind,
        entity: &LedgerRef,
    ) -> LedgerResult<&'a mut FakeEntry> {
        inner
            .registries
            .get_mut(&kind)
            .and_then(|entries| entries.iter_mut().find(|e| &e.ledger_ref == entity))
            .ok_or_else(|| LedgerError::Reverted {
                reason: "unknown entity".to_string(),
            })
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn register(
        &self,
        kind: EntityKind,
        parent_team: Option<&LedgerRef>,
        _payload: Value,
        fingerprint: &Fingerprint,
    ) -> LedgerResult<PendingOp> {
        let mut inner = self.inner.lock().unwrap();
        Self::record_call(&mut inner, kind, "register", None);
        if let Some(op) = Self::scripted_outcome(&mut inner)? {
            return Ok(op);
        }

        if kind != EntityKind::Team && parent_team.is_none() {
            return Ok(PendingOp::ready(
                SubmissionHandle::generate(),
                Err(LedgerError::Reverted {
                    reason: "registration requires a parent team".to_string(),
                }),
            ));
        }

        inner.next_ref += 1;
        let ledger_ref = LedgerRef::from(inner.next_ref.to_string());
        inner.registries.entry(kind).or_default().push(FakeEntry {
            ledger_ref: ledger_ref.clone(),
            parent: parent_team.cloned(),
            fingerprint: Some(*fingerprint),
            status: 0,
            removed: false,
        });
        Ok(Self::confirm_receipt(&mut inner, ledger_ref))
    }

    async fn update_fingerprint(
        &self,
        kind: EntityKind,
        entity: &LedgerRef,
        fingerprint: &Fingerprint,
    ) -> LedgerResult<PendingOp> {
        let mut inner = self.inner.lock().unwrap();
        Self::record_call(&mut inner, kind, "update_fingerprint", Some(entity));
        if let Some(op) = Self::scripted_outcome(&mut inner)? {
            return Ok(op);
        }

        match Self::entry_mut(&mut inner, kind, entity) {
            Ok(entry) if entry.removed => Ok(PendingOp::ready(
                SubmissionHandle::generate(),
                Err(LedgerError::Reverted {
                    reason: "entity already removed".to_string(),
                }),
            )),
            Ok(entry) => {
                entry.fingerprint = Some(*fingerprint);
                let confirmed = entry.ledger_ref.clone();
                Ok(Self::confirm_receipt(&mut inner, confirmed))
            }
            Err(err) => Ok(PendingOp::ready(SubmissionHandle::generate(), Err(err))),
        }
    }

    async fn change_status(
        &self,
        kind: EntityKind,
        entity: &LedgerRef,
        status_code: u8,
    ) -> LedgerResult<PendingOp> {
        let mut inner = self.inner.lock().unwrap();
        Self::record_call(&mut inner, kind, "change_status", Some(entity));
        if let Some(op) = Self::scripted_outcome(&mut inner)? {
            return Ok(op);
        }

        match Self::entry_mut(&mut inner, kind, entity) {
            Ok(entry) if entry.removed => Ok(PendingOp::ready(
                SubmissionHandle::generate(),
                Err(LedgerError::Reverted {
                    reason: "entity already removed".to_string(),
                }),
            )),
            Ok(entry) => {
                entry.status = status_code;
                let confirmed = entry.ledger_ref.clone();
                Ok(Self::confirm_receipt(&mut inner, confirmed))
            }
            Err(err) => Ok(PendingOp::ready(SubmissionHandle::generate(), Err(err))),
        }
    }

    async fn remove(&self, kind: EntityKind, entity: &LedgerRef) -> LedgerResult<PendingOp> {
        let mut inner = self.inner.lock().unwrap();
        Self::record_call(&mut inner, kind, "remove", Some(entity));
        if let Some(op) = Self::scripted_outcome(&mut inner)? {
            return Ok(op);
        }

        match Self::entry_mut(&mut inner, kind, entity) {
            Ok(entry) if entry.removed => Ok(PendingOp::ready(
                SubmissionHandle::generate(),
                Err(LedgerError::Reverted {
                    reason: "entity already removed".to_string(),
                }),
            )),
            Ok(entry) => {
                entry.removed = true;
                let confirmed = entry.ledger_ref.clone();
                Ok(Self::confirm_receipt(&mut inner, confirmed))
            }
            Err(err) => Ok(PendingOp::ready(SubmissionHandle::generate(), Err(err))),
        }
    }

    async fn team_members(
        &self,
        kind: EntityKind,
        team: &LedgerRef,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut inner = self.inner.lock().unwrap();
        Self::record_call(&mut inner, kind, "team_members", Some(team));
        if inner.offline {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }

        let serve = inner.serve_fingerprints;
        Ok(inner
            .registries
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.parent.as_ref() == Some(team) && !e.removed)
                    .map(|e| LedgerEntry {
                        ledger_ref: e.ledger_ref.clone(),
                        fingerprint: if serve { e.fingerprint } else { None },
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditLog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AuditInner {
    records: Vec<AuditRecord>,
    fail_appends: bool,
}

/// In-memory audit log, newest-first queries.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    inner: Mutex<AuditInner>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `append` fail, to exercise best-effort audit paths.
    pub fn set_fail_appends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_appends = fail;
    }

    /// All records in append order, for assertions.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().unwrap().records.clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_appends {
            return Err(StoreError::Network("audit sink offline".to_string()));
        }
        inner.records.push(record);
        Ok(())
    }

    async fn query(
        &self,
        filter: AuditFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<AuditPage> {
        let inner = self.inner.lock().unwrap();
        let matched: Vec<AuditRecord> = inner
            .records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let total = matched.len();
        let records = matched.into_iter().skip(offset).take(limit).collect();
        Ok(AuditPage {
            records,
            offset,
            total,
        })
    }

    async fn purge(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.records.len() as u64;
        inner.records.clear();
        Ok(removed)
    }
}
