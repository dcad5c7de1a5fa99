//! Audit log trait and record types.
//!
//! One immutable record per attempted ledger operation. The log is
//! append-only; history views read it with pagination and filters, and
//! the only whole-log mutation is the administrative `purge`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::types::{EntityKind, LedgerRef, LocalId, SubmissionHandle};

/// Terminal outcome of an attempted ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Confirmed,
    Declined,
    Unavailable,
    Reverted,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Confirmed => "confirmed",
            AuditOutcome::Declined => "declined",
            AuditOutcome::Unavailable => "unavailable",
            AuditOutcome::Reverted => "reverted",
        }
    }
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempted ledger operation, as history views see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Submission handle, known before confirmation.
    pub handle: SubmissionHandle,
    /// Registry contract the operation targeted.
    pub contract: String,
    /// Contract method: register / update_fingerprint / change_status / remove.
    pub method: String,
    pub kind: EntityKind,
    pub local_id: LocalId,
    /// Owning team, `None` for teams themselves. History views and the
    /// offline mapping heuristic both scope by it.
    pub team_id: Option<LocalId>,
    pub outcome: AuditOutcome,
    /// Confirmed ledger ref, known only for confirmed operations. For
    /// `register` this is the only durable trace of the assigned ref if
    /// persisting the relational link later fails.
    pub entity_ref: Option<LedgerRef>,
    /// Resource fee, known only for confirmed operations.
    pub cost: Option<u64>,
    /// Containing block, known only for confirmed operations.
    pub block: Option<u64>,
    /// Human-readable summary for history rows.
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

/// Filter for history queries. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub kind: Option<EntityKind>,
    pub method: Option<String>,
    pub outcome: Option<AuditOutcome>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.kind.map_or(true, |k| record.kind == k)
            && self
                .method
                .as_deref()
                .map_or(true, |m| record.method == m)
            && self.outcome.map_or(true, |o| record.outcome == o)
    }
}

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    pub offset: usize,
    /// Total records matching the filter, across all pages.
    pub total: usize,
}

/// Append-only sink for ledger operation records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record. Never mutates existing records.
    async fn append(&self, record: AuditRecord) -> StoreResult<()>;

    /// Query history, newest first.
    async fn query(
        &self,
        filter: AuditFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<AuditPage>;

    /// Administrative whole-log purge. Returns the number of records
    /// removed. No ledger-side effect.
    async fn purge(&self) -> StoreResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: EntityKind, method: &str, outcome: AuditOutcome) -> AuditRecord {
        AuditRecord {
            handle: SubmissionHandle::generate(),
            contract: "sprint_registry".to_string(),
            method: method.to_string(),
            kind,
            local_id: LocalId(1),
            team_id: None,
            outcome,
            entity_ref: None,
            cost: None,
            block: None,
            description: String::new(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = AuditFilter::default();
        assert!(filter.matches(&record(
            EntityKind::Sprint,
            "register",
            AuditOutcome::Confirmed
        )));
    }

    #[test]
    fn filter_is_conjunctive() {
        let filter = AuditFilter {
            kind: Some(EntityKind::Task),
            method: Some("remove".to_string()),
            outcome: Some(AuditOutcome::Declined),
        };
        assert!(filter.matches(&record(EntityKind::Task, "remove", AuditOutcome::Declined)));
        assert!(!filter.matches(&record(EntityKind::Task, "remove", AuditOutcome::Confirmed)));
        assert!(!filter.matches(&record(EntityKind::Task, "register", AuditOutcome::Declined)));
        assert!(!filter.matches(&record(EntityKind::Sprint, "remove", AuditOutcome::Declined)));
    }
}
