//! Ledger gateway trait — the append-only audit overlay.
//!
//! One operation family per entity kind; each kind maps to its own
//! deployed registry contract. Every state-changing call is irreversible
//! once confirmed, so the gateway never retries automatically — retry
//! policy lives in the orchestrator.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LedgerResult;
use crate::types::{EntityKind, Fingerprint, LedgerEntry, LedgerRef, PendingOp};

/// Registry contract name for an entity kind. Fixed across the deployed
/// contract set; audit records carry it for history filtering.
pub fn contract_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Team => "team_registry",
        EntityKind::BacklogItem => "backlog_registry",
        EntityKind::Sprint => "sprint_registry",
        EntityKind::Task => "task_registry",
    }
}

/// Entity-scoped operations against the ledger's contract set.
///
/// Submission and confirmation are separate failure points: a method
/// returning `Ok(PendingOp)` means the operation reached the signer;
/// [`PendingOp::confirm`] resolves the terminal outcome. Both legs fail
/// with [`crate::LedgerError`].
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Register a new entity. `parent_team` is the owning team's ledger
    /// ref — required for every kind except `Team`. The confirmation
    /// receipt carries the newly assigned ref.
    async fn register(
        &self,
        kind: EntityKind,
        parent_team: Option<&LedgerRef>,
        payload: Value,
        fingerprint: &Fingerprint,
    ) -> LedgerResult<PendingOp>;

    /// Replace the entity's on-ledger fingerprint.
    async fn update_fingerprint(
        &self,
        kind: EntityKind,
        entity: &LedgerRef,
        fingerprint: &Fingerprint,
    ) -> LedgerResult<PendingOp>;

    /// Record a status transition using the kind's fixed code set.
    async fn change_status(
        &self,
        kind: EntityKind,
        entity: &LedgerRef,
        status_code: u8,
    ) -> LedgerResult<PendingOp>;

    /// Remove the entity from its registry.
    async fn remove(&self, kind: EntityKind, entity: &LedgerRef) -> LedgerResult<PendingOp>;

    /// Read-only: the team's members of a kind, in registration order.
    /// Entries carry on-ledger fingerprints when the contract still
    /// serves them.
    async fn team_members(
        &self,
        kind: EntityKind,
        team: &LedgerRef,
    ) -> LedgerResult<Vec<LedgerEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_contract() {
        let names: Vec<&str> = EntityKind::all().iter().map(|k| contract_name(*k)).collect();
        assert_eq!(
            names,
            vec![
                "team_registry",
                "backlog_registry",
                "sprint_registry",
                "task_registry"
            ],
        );
    }
}
