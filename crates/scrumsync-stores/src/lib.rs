//! Store adapters for ScrumSync (Layer 0).
//!
//! Defines the three external collaborators the reconciliation engine
//! talks to, plus the identifier and receipt types they share:
//! - [`RelationalStore`]: CRUD gateway to the system of record — always
//!   the first and authoritative write.
//! - [`LedgerGateway`]: entity-scoped operations against the append-only
//!   ledger's contract set.
//! - [`AuditLog`]: append-only sink recording every attempted ledger
//!   operation.
//!
//! All traits are async and backend-agnostic. Production backends are
//! HTTP (`HttpRelationalStore`, `HttpAuditLog`, `SignerBridgeGateway`);
//! in-memory fakes live in the `fakes` module.

pub mod audit;
pub mod error;
pub mod fakes;
pub mod http;
pub mod ledger;
pub mod relational;
pub mod signer;
pub mod types;

pub use audit::{AuditFilter, AuditLog, AuditOutcome, AuditPage, AuditRecord};
pub use error::{LedgerError, LedgerResult, StoreError, StoreResult};
pub use http::{ApiConfig, HttpAuditLog, HttpRelationalStore};
pub use ledger::{contract_name, LedgerGateway};
pub use relational::RelationalStore;
pub use signer::{SignerBridgeGateway, SignerConfig};
pub use types::{
    EntityKind, Fingerprint, LedgerEntry, LedgerRef, LocalId, PendingOp, Receipt, StoredEntity,
    SubmissionHandle,
};
