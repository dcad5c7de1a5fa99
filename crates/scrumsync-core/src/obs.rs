//! Structured observability hooks for sync pipeline events.
//!
//! Emitted at `info!` (expected flow) or `warn!` (degradations that do
//! not change the pipeline outcome). Use `RUST_LOG` to filter.

use tracing::{info, warn};

use scrumsync_stores::{EntityKind, LocalId, SubmissionHandle};

/// RAII guard entering a pipeline-scoped tracing span.
pub struct SyncSpan {
    _span: tracing::span::EnteredSpan,
}

impl SyncSpan {
    /// Create and enter a span tagged with the entity under sync.
    pub fn enter(op: &str, kind: EntityKind, id: Option<LocalId>) -> Self {
        let id = id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string());
        let span = tracing::info_span!("scrumsync.pipeline", op = %op, kind = %kind, id = %id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: relational write applied (the authoritative leg).
pub fn emit_relational_written(op: &str, kind: EntityKind, id: LocalId) {
    info!(event = "relational.written", op = %op, kind = %kind, id = %id);
}

/// Emit event: ledger operation submitted.
pub fn emit_ledger_submitted(kind: EntityKind, id: LocalId, method: &str, handle: &SubmissionHandle) {
    info!(event = "ledger.submitted", kind = %kind, id = %id, method = %method, handle = %handle);
}

/// Emit event: ledger operation confirmed.
pub fn emit_ledger_confirmed(kind: EntityKind, id: LocalId, method: &str, block: u64, cost: u64) {
    info!(
        event = "ledger.confirmed",
        kind = %kind,
        id = %id,
        method = %method,
        block = block,
        cost = cost,
    );
}

/// Emit event: ledger leg failed; the relational outcome stands.
pub fn emit_ledger_failed(kind: EntityKind, id: LocalId, method: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "ledger.failed", kind = %kind, id = %id, method = %method, reason = %reason);
}

/// Emit event: mapping resolved, with the confidence tier that won.
pub fn emit_mapping_resolved(kind: EntityKind, id: LocalId, confidence: &str) {
    info!(event = "mapping.resolved", kind = %kind, id = %id, confidence = %confidence);
}

/// Emit event: a low-confidence positional mapping was produced.
pub fn emit_mapping_degraded(kind: EntityKind, id: LocalId) {
    warn!(event = "mapping.degraded", kind = %kind, id = %id);
}

/// Emit event: persisting the ledger link failed after confirmation.
/// The link is recoverable by a later resolver pass.
pub fn emit_link_persist_failed(kind: EntityKind, id: LocalId, error: &dyn std::fmt::Display) {
    warn!(event = "ledger.link_persist_failed", kind = %kind, id = %id, error = %error);
}

/// Emit event: audit append failed (best-effort, outcome unchanged).
pub fn emit_audit_append_failed(error: &dyn std::fmt::Display) {
    warn!(event = "audit.append_failed", error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_span_create() {
        let _span = SyncSpan::enter("update", EntityKind::Task, Some(LocalId(7)));
    }
}
