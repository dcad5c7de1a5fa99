//! Audit recorder: one immutable record per attempted ledger operation.
//!
//! Appends are best-effort by design — a failed append is logged and
//! flagged on the report, but never overturns the pipeline outcome that
//! has already been determined.

use std::sync::Arc;

use chrono::Utc;

use scrumsync_stores::{
    contract_name, AuditLog, AuditOutcome, AuditRecord, EntityKind, LocalId, Receipt,
    SubmissionHandle,
};

use crate::obs::emit_audit_append_failed;

/// One attempted ledger operation, ready to be recorded.
#[derive(Debug)]
pub struct LedgerAttempt<'a> {
    pub kind: EntityKind,
    pub local_id: LocalId,
    pub team_id: Option<LocalId>,
    pub method: &'a str,
    pub handle: SubmissionHandle,
    pub outcome: AuditOutcome,
    /// Present only for confirmed operations.
    pub receipt: Option<&'a Receipt>,
    /// Entity label for the human-readable description.
    pub label: &'a str,
}

/// Best-effort writer over an [`AuditLog`].
pub struct AuditRecorder {
    audit: Arc<dyn AuditLog>,
}

impl AuditRecorder {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self { audit }
    }

    /// Append one record. Returns whether the record landed; failures
    /// are logged at warn and otherwise swallowed.
    pub async fn record(&self, attempt: LedgerAttempt<'_>) -> bool {
        let record = AuditRecord {
            handle: attempt.handle,
            contract: contract_name(attempt.kind).to_string(),
            method: attempt.method.to_string(),
            kind: attempt.kind,
            local_id: attempt.local_id,
            team_id: attempt.team_id,
            outcome: attempt.outcome,
            entity_ref: attempt.receipt.map(|r| r.confirmed_ref.clone()),
            cost: attempt.receipt.map(|r| r.cost),
            block: attempt.receipt.map(|r| r.block),
            description: format!(
                "{} {} '{}'",
                attempt.method, attempt.kind, attempt.label
            ),
            recorded_at: Utc::now(),
        };

        match self.audit.append(record).await {
            Ok(()) => true,
            Err(err) => {
                emit_audit_append_failed(&err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrumsync_stores::fakes::MemoryAuditLog;
    use scrumsync_stores::AuditFilter;

    fn attempt(handle: SubmissionHandle) -> LedgerAttempt<'static> {
        LedgerAttempt {
            kind: EntityKind::BacklogItem,
            local_id: LocalId(42),
            team_id: Some(LocalId(3)),
            method: "register",
            handle,
            outcome: AuditOutcome::Confirmed,
            receipt: None,
            label: "Login flow",
        }
    }

    #[tokio::test]
    async fn record_builds_a_readable_description() {
        let log = Arc::new(MemoryAuditLog::new());
        let recorder = AuditRecorder::new(log.clone());

        assert!(recorder.record(attempt(SubmissionHandle::generate())).await);

        let page = log.query(AuditFilter::default(), 0, 10).await.unwrap();
        assert_eq!(page.records[0].contract, "backlog_registry");
        assert_eq!(
            page.records[0].description,
            "register backlog_item 'Login flow'"
        );
    }

    #[tokio::test]
    async fn append_failure_is_swallowed() {
        let log = Arc::new(MemoryAuditLog::new());
        log.set_fail_appends(true);
        let recorder = AuditRecorder::new(log.clone());

        assert!(!recorder.record(attempt(SubmissionHandle::generate())).await);
    }
}
