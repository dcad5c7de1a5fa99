//! Derived synchronization state.

use serde::{Deserialize, Serialize};

use scrumsync_stores::StoredEntity;

use crate::domain::error::Result;
use crate::fingerprint::fingerprint_of;

/// Where an entity stands relative to the ledger. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No ledger ref yet.
    Unsynced,
    /// Ledger ref present and the last confirmed ledger fingerprint
    /// equals the current one.
    Synced,
    /// Ledger ref present but the fingerprints disagree — typically a
    /// relational update whose ledger write failed.
    Drifted,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unsynced => "unsynced",
            SyncState::Synced => "synced",
            SyncState::Drifted => "drifted",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive a row's sync state from its bookkeeping and current fields.
pub fn sync_state_of(row: &StoredEntity) -> Result<SyncState> {
    if row.ledger_ref.is_none() {
        return Ok(SyncState::Unsynced);
    }
    let current = fingerprint_of(row)?;
    if row.ledger_fingerprint == Some(current) {
        Ok(SyncState::Synced)
    } else {
        Ok(SyncState::Drifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use scrumsync_stores::{EntityKind, LedgerRef, LocalId};

    use crate::fingerprint::entity_fingerprint;

    fn row() -> StoredEntity {
        StoredEntity {
            kind: EntityKind::Team,
            local_id: LocalId(1),
            team_id: None,
            fields: json!({"name": "core", "description": ""}),
            ledger_ref: None,
            ledger_fingerprint: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_ref_is_unsynced() {
        assert_eq!(sync_state_of(&row()).unwrap(), SyncState::Unsynced);
    }

    #[test]
    fn matching_fingerprint_is_synced() {
        let mut r = row();
        r.ledger_ref = Some(LedgerRef::from("1"));
        r.ledger_fingerprint =
            Some(entity_fingerprint(r.kind, r.team_id, &r.fields).unwrap());
        assert_eq!(sync_state_of(&r).unwrap(), SyncState::Synced);
    }

    #[test]
    fn stale_fingerprint_is_drifted() {
        let mut r = row();
        r.ledger_ref = Some(LedgerRef::from("1"));
        r.ledger_fingerprint =
            Some(entity_fingerprint(r.kind, r.team_id, &r.fields).unwrap());
        r.fields["name"] = json!("core-infra");
        assert_eq!(sync_state_of(&r).unwrap(), SyncState::Drifted);
    }
}
