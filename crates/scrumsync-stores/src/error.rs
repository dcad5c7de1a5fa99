//! Error types for the store adapters.

use thiserror::Error;

use crate::types::{EntityKind, LocalId};

/// Result type for relational-store and audit-log operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for ledger gateway operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors from the relational store and the audit sink.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure reaching the store.
    #[error("store unreachable: {0}")]
    Network(String),

    /// The bearer token was missing or rejected.
    #[error("store authentication failed: {0}")]
    Auth(String),

    /// The store's API reported `success: false`.
    #[error("store rejected request: {message}")]
    Rejected { message: String },

    /// No row for the given kind and id.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: LocalId },

    /// Attempt to overwrite an existing ledger link with a different
    /// ref. The local-to-ledger mapping is append-only.
    #[error("{kind} {id} already linked to a different ledger ref")]
    LedgerRefConflict { kind: EntityKind, id: LocalId },

    /// A response body could not be decoded.
    #[error("malformed store response: {0}")]
    Decode(String),

    /// A fingerprint string failed validation.
    #[error("invalid fingerprint: {value}")]
    InvalidFingerprint { value: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Errors from the ledger gateway.
///
/// The gateway never retries on its own; the orchestrator decides which
/// of these are retryable (only [`LedgerError::Unavailable`] is).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The signer/operator explicitly refused authorization.
    #[error("ledger operation declined by the signer")]
    Declined,

    /// Network or node problem; the operation may be retried.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger's own business rule rejected the operation. The
    /// revert reason is surfaced verbatim.
    #[error("ledger reverted: {reason}")]
    Reverted { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages_name_the_entity() {
        let err = StoreError::NotFound {
            kind: EntityKind::Sprint,
            id: LocalId(9),
        };
        assert_eq!(err.to_string(), "sprint 9 not found");
    }

    #[test]
    fn revert_reason_is_surfaced_verbatim() {
        let err = LedgerError::Reverted {
            reason: "entity already exists".to_string(),
        };
        assert!(err.to_string().contains("entity already exists"));
    }
}
