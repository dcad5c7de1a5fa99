//! Relational store trait — the system of record.
//!
//! Always the first and authoritative write in every sync pipeline. The
//! store owns [`LocalId`] generation; the engine never invents ids.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::types::{EntityKind, Fingerprint, LedgerRef, LocalId, StoredEntity};

/// CRUD gateway to the relational system of record.
///
/// Guarantees:
/// - `insert` assigns a fresh `LocalId` and `created_at`; both are
///   stable for the row's lifetime.
/// - `list` returns rows ordered by `(created_at, local_id)` ascending —
///   the positional mapping heuristic depends on this order.
/// - `record_ledger_link` is append-only: linking a row that already
///   carries a *different* ledger ref fails with `LedgerRefConflict`.
///   Re-recording the same ref (with a fresh fingerprint) is allowed;
///   that is how post-update fingerprint bookkeeping is persisted.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Insert a new row. `team_id` is the owning team for child
    /// entities and `None` for teams themselves.
    async fn insert(
        &self,
        kind: EntityKind,
        team_id: Option<LocalId>,
        fields: Value,
    ) -> StoreResult<StoredEntity>;

    /// Replace a row's business fields, returning the updated row.
    async fn update(&self, kind: EntityKind, id: LocalId, fields: Value)
        -> StoreResult<StoredEntity>;

    /// Tombstoning delete. Authoritative regardless of any later ledger
    /// outcome.
    async fn delete(&self, kind: EntityKind, id: LocalId) -> StoreResult<()>;

    /// Fetch a single row.
    async fn fetch(&self, kind: EntityKind, id: LocalId) -> StoreResult<StoredEntity>;

    /// List rows of a kind, optionally scoped to one team, ordered by
    /// `(created_at, local_id)` ascending.
    async fn list(&self, kind: EntityKind, team_id: Option<LocalId>)
        -> StoreResult<Vec<StoredEntity>>;

    /// Persist the row's ledger link and last confirmed fingerprint.
    async fn record_ledger_link(
        &self,
        kind: EntityKind,
        id: LocalId,
        ledger_ref: &LedgerRef,
        fingerprint: &Fingerprint,
    ) -> StoreResult<()>;
}
