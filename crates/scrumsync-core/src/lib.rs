//! ScrumSync Core Library
//!
//! The reconciliation engine that keeps Scrum artifacts consistent
//! across a fast relational system of record and a slower, append-only
//! ledger. Re-exports the engine components for programmatic access.

pub mod domain;
pub mod fingerprint;
pub mod obs;
pub mod orchestrator;
pub mod recorder;
pub mod resolver;
pub mod sync_state;
pub mod telemetry;

pub use domain::{
    entity_label, ledger_status_code, BacklogItem, BacklogStatus, LedgerMiss, Priority, Result,
    ScrumEntity, Sprint, SprintStatus, SyncError, Task, TaskStatus, Team, TeamStatus,
};

pub use fingerprint::{canonical_tracked_json, entity_fingerprint, fingerprint_of, tracked_keys};

pub use obs::{
    emit_ledger_confirmed, emit_ledger_failed, emit_ledger_submitted, emit_mapping_degraded,
    emit_mapping_resolved, emit_relational_written, SyncSpan,
};

pub use orchestrator::{RetryPolicy, SyncOrchestrator, SyncOutcome, SyncReport};

pub use recorder::{AuditRecorder, LedgerAttempt};

pub use resolver::{MappingConfidence, MappingResolver, ResolvedRef};

pub use sync_state::{sync_state_of, SyncState};

pub use telemetry::init_tracing;

pub use scrumsync_stores::{
    contract_name, AuditFilter, AuditLog, AuditOutcome, AuditPage, AuditRecord, EntityKind,
    Fingerprint, LedgerEntry, LedgerError, LedgerGateway, LedgerRef, LocalId, PendingOp, Receipt,
    RelationalStore, StoreError, StoredEntity, SubmissionHandle,
};

/// ScrumSync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
