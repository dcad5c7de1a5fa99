//! Shared identifier, fingerprint, and receipt types.
//!
//! These types cross every store boundary: the relational adapter keys
//! rows by [`LocalId`], the ledger gateway keys everything by
//! [`LedgerRef`], and [`Fingerprint`] is the bridge between the two when
//! no explicit link exists.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerResult, StoreError};

/// Relational-store identifier, generated exclusively by the store on
/// insert and stable for the entity's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LocalId(pub i64);

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger-native identifier or correlation token.
///
/// Opaque to the engine; once recorded against a [`LocalId`] it is never
/// reassigned to a different one (the mapping is append-only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerRef(String);

impl LedgerRef {
    pub fn new(token: impl Into<String>) -> Self {
        LedgerRef(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LedgerRef {
    fn from(token: &str) -> Self {
        LedgerRef(token.to_string())
    }
}

impl From<String> for LedgerRef {
    fn from(token: String) -> Self {
        LedgerRef(token)
    }
}

impl std::fmt::Display for LedgerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte SHA-256 fingerprint of an entity's tracked business fields.
///
/// Rendered as 64 lowercase hex chars on the wire. Equal tracked fields
/// always produce an equal fingerprint; the resolver relies on this as a
/// correctness property, not an optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash raw bytes (callers canonicalize first).
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Fingerprint(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short form (first 12 hex chars) for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| StoreError::InvalidFingerprint {
            value: s.to_string(),
        })?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::InvalidFingerprint {
                value: s.to_string(),
            })?;
        Ok(Fingerprint(raw))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The four synchronized entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Team,
    BacklogItem,
    Sprint,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Team => "team",
            EntityKind::BacklogItem => "backlog_item",
            EntityKind::Sprint => "sprint",
            EntityKind::Task => "task",
        }
    }

    pub fn all() -> [EntityKind; 4] {
        [
            EntityKind::Team,
            EntityKind::BacklogItem,
            EntityKind::Sprint,
            EntityKind::Task,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A relational row: entity fields plus sync bookkeeping.
///
/// `fields` holds the entity's business body as JSON; the typed domain
/// structs in `scrumsync-core` serialize to and from it. `ledger_ref`
/// and `ledger_fingerprint` are maintained through
/// [`crate::relational::RelationalStore::record_ledger_link`] only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntity {
    pub kind: EntityKind,
    pub local_id: LocalId,
    /// Owning team. `None` for teams themselves.
    pub team_id: Option<LocalId>,
    pub fields: serde_json::Value,
    pub ledger_ref: Option<LedgerRef>,
    /// Last fingerprint confirmed on the ledger for this entity.
    pub ledger_fingerprint: Option<Fingerprint>,
    pub created_at: DateTime<Utc>,
}

/// Opaque id of a submitted ledger operation.
///
/// Available before confirmation, so audit records can correlate an
/// attempt with its eventual outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionHandle(String);

impl SubmissionHandle {
    /// Generate a fresh random handle.
    pub fn generate() -> Self {
        SubmissionHandle(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        SubmissionHandle(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confirmation receipt for a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The entity's ledger ref — newly assigned for `register`, echoed
    /// back for every other operation.
    pub confirmed_ref: LedgerRef,
    /// Containing-block reference.
    pub block: u64,
    /// Network resource fee charged for the operation.
    pub cost: u64,
}

/// One member of a team as seen on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ledger_ref: LedgerRef,
    /// Absent when the entity predates fingerprint tracking or the
    /// ledger no longer serves fingerprints.
    pub fingerprint: Option<Fingerprint>,
}

/// Handle to a submitted ledger operation.
///
/// The submission handle is available immediately; [`PendingOp::confirm`]
/// awaits the operation's terminal state. Once submitted, an operation
/// cannot be cancelled — dropping the handle abandons it, and its
/// eventual confirmation is reconciled by a later mapping resolution.
/// The engine enforces no timeout; callers that need a deadline wrap
/// `confirm()` themselves and must treat expiry as an unknown outcome,
/// not a failure.
pub struct PendingOp {
    handle: SubmissionHandle,
    confirmation: BoxFuture<'static, LedgerResult<Receipt>>,
}

impl PendingOp {
    pub fn new(
        handle: SubmissionHandle,
        confirmation: BoxFuture<'static, LedgerResult<Receipt>>,
    ) -> Self {
        Self {
            handle,
            confirmation,
        }
    }

    /// A pending operation whose outcome is already known (fakes,
    /// bridges that confirm synchronously).
    pub fn ready(handle: SubmissionHandle, outcome: LedgerResult<Receipt>) -> Self {
        Self {
            handle,
            confirmation: Box::pin(async move { outcome }),
        }
    }

    pub fn handle(&self) -> &SubmissionHandle {
        &self.handle
    }

    /// Await the operation's terminal state.
    pub async fn confirm(self) -> LedgerResult<Receipt> {
        self.confirmation.await
    }

    /// Await and keep the handle alongside the result, for audit
    /// correlation after consumption.
    pub async fn settle(self) -> (SubmissionHandle, LedgerResult<Receipt>) {
        let handle = self.handle.clone();
        (handle, self.confirmation.await)
    }
}

impl std::fmt::Debug for PendingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOp")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_round_trips_through_hex() {
        let fp = Fingerprint::from_bytes(b"sprint 14 planning");
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_rejects_short_hex() {
        let err = "abc123".parse::<Fingerprint>().unwrap_err();
        assert!(matches!(err, StoreError::InvalidFingerprint { .. }));
    }

    #[test]
    fn fingerprint_rejects_non_hex() {
        let bogus = "zz".repeat(32);
        assert!(bogus.parse::<Fingerprint>().is_err());
    }

    #[test]
    fn equal_bytes_equal_fingerprint() {
        assert_eq!(
            Fingerprint::from_bytes(b"identical"),
            Fingerprint::from_bytes(b"identical"),
        );
        assert_ne!(
            Fingerprint::from_bytes(b"alpha"),
            Fingerprint::from_bytes(b"beta"),
        );
    }

    #[test]
    fn entity_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EntityKind::BacklogItem).unwrap();
        assert_eq!(json, r#""backlog_item""#);
    }

    #[tokio::test]
    async fn ready_pending_op_confirms_immediately() {
        let handle = SubmissionHandle::generate();
        let receipt = Receipt {
            confirmed_ref: LedgerRef::from("7"),
            block: 42,
            cost: 21,
        };
        let op = PendingOp::ready(handle.clone(), Ok(receipt.clone()));
        assert_eq!(op.handle(), &handle);
        assert_eq!(op.confirm().await.unwrap(), receipt);
    }
}
