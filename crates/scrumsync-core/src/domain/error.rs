//! Engine-level error taxonomy.
//!
//! Two layers, deliberately separate: [`SyncError`] is fatal to a whole
//! request (the relational write never happened, or the request itself
//! was invalid), while [`LedgerMiss`] describes why the ledger leg of an
//! otherwise-successful request did not land — those surface as partial
//! outcomes, never as errors.

use scrumsync_stores::{EntityKind, LedgerError, LocalId, StoreError};

/// Reasons the ledger leg was skipped or failed after the relational
/// write succeeded. Carried by `SyncOutcome::Partial`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerMiss {
    /// The owning team has no confirmed ledger ref; every child ledger
    /// write is blocked until the team is synchronized.
    #[error("team {team} is not synchronized to the ledger; sync the team first")]
    TeamNotSynced { team: LocalId },

    /// No discoverable ledger counterpart for the entity. The ledger
    /// side becomes a no-op; the relational outcome stands.
    #[error("{kind} {id} has no discoverable ledger counterpart")]
    MappingNotFound { kind: EntityKind, id: LocalId },

    /// The signer explicitly refused authorization. Never retried.
    #[error("ledger operation declined by the signer")]
    Declined,

    /// Network/node problem after retries were exhausted.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger's business rule rejected the operation; reason verbatim.
    #[error("ledger reverted: {reason}")]
    Reverted { reason: String },
}

impl From<LedgerError> for LedgerMiss {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Declined => LedgerMiss::Declined,
            LedgerError::Unavailable(detail) => LedgerMiss::Unavailable(detail),
            LedgerError::Reverted { reason } => LedgerMiss::Reverted { reason },
        }
    }
}

/// Fatal engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The relational write failed; the whole request fails and no
    /// ledger attempt is made.
    #[error("relational store failure: {0}")]
    Relational(#[from] StoreError),

    /// Canonical serialization could not produce a fingerprint.
    #[error("canonicalization failed: {0}")]
    Canonical(String),

    /// A status label outside the kind's closed set.
    #[error("unknown status '{label}' for {kind}")]
    UnknownStatus { kind: EntityKind, label: String },

    /// Entity-level validation failed before any write.
    #[error("invalid {kind}: {reason}")]
    InvalidEntity { kind: EntityKind, reason: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_not_synced_names_the_team() {
        let miss = LedgerMiss::TeamNotSynced { team: LocalId(3) };
        assert!(miss.to_string().contains("team 3"));
    }

    #[test]
    fn ledger_errors_map_onto_misses() {
        assert_eq!(LedgerMiss::from(LedgerError::Declined), LedgerMiss::Declined);
        assert_eq!(
            LedgerMiss::from(LedgerError::Reverted {
                reason: "caller lacks permission".to_string()
            }),
            LedgerMiss::Reverted {
                reason: "caller lacks permission".to_string()
            }
        );
    }
}
