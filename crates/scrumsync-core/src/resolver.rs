//! ID mapping resolution: relational id → ledger ref.
//!
//! The ledger exposes no foreign key back to relational identifiers, so
//! the resolver infers the correspondence through three strategies in
//! decreasing order of confidence, stopping at the first success. It is
//! idempotent and side-effect-free — it reads and infers, never writes.

use std::sync::Arc;

use tracing::debug;

use scrumsync_stores::{
    AuditFilter, AuditLog, AuditOutcome, LedgerError, LedgerGateway, LedgerRef, RelationalStore,
    StoredEntity,
};

use crate::domain::error::Result;
use crate::fingerprint::fingerprint_of;
use crate::obs::{emit_mapping_degraded, emit_mapping_resolved};

/// Upper bound on audit records replayed when rebuilding a ref list
/// offline. Teams with more historical registrations than this cannot be
/// positionally resolved while the ledger is down.
const AUDIT_REPLAY_LIMIT: usize = 10_000;

/// Trust level of a resolved ledger ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingConfidence {
    /// Previously persisted link on the relational row.
    Direct,
    /// Exact on-ledger fingerprint match.
    Replay,
    /// Positional guess; callers should refuse it for destructive
    /// operations.
    Heuristic,
}

impl MappingConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingConfidence::Direct => "direct",
            MappingConfidence::Replay => "replay",
            MappingConfidence::Heuristic => "heuristic",
        }
    }
}

/// A resolved ledger ref, tagged with how much to trust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub ledger_ref: LedgerRef,
    pub confidence: MappingConfidence,
}

/// Read-only resolver over the three stores.
pub struct MappingResolver {
    relational: Arc<dyn RelationalStore>,
    ledger: Arc<dyn LedgerGateway>,
    audit: Arc<dyn AuditLog>,
}

impl MappingResolver {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        ledger: Arc<dyn LedgerGateway>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            relational,
            ledger,
            audit,
        }
    }

    /// Resolve a row's ledger ref.
    ///
    /// `team_ref` is the owning team's confirmed ledger ref; without it
    /// only direct correlation can succeed (teams themselves have no
    /// parent registry to replay against).
    ///
    /// Strategy precedence is strict: a direct link short-circuits
    /// everything, and when the ledger serves fingerprints a failed
    /// replay is a miss — the positional heuristic runs only when
    /// fingerprints are not served at all.
    pub async fn resolve(
        &self,
        row: &StoredEntity,
        team_ref: Option<&LedgerRef>,
    ) -> Result<Option<ResolvedRef>> {
        if let Some(ledger_ref) = &row.ledger_ref {
            emit_mapping_resolved(row.kind, row.local_id, MappingConfidence::Direct.as_str());
            return Ok(Some(ResolvedRef {
                ledger_ref: ledger_ref.clone(),
                confidence: MappingConfidence::Direct,
            }));
        }

        let Some(team_ref) = team_ref else {
            return Ok(None);
        };

        match self.ledger.team_members(row.kind, team_ref).await {
            Ok(entries) if entries.is_empty() => Ok(None),
            Ok(entries) => {
                if entries.iter().any(|e| e.fingerprint.is_some()) {
                    // Replay is authoritative when fingerprints are
                    // served: no match means no counterpart.
                    let current = fingerprint_of(row)?;
                    let hit = entries
                        .iter()
                        .find(|e| e.fingerprint == Some(current))
                        .map(|e| ResolvedRef {
                            ledger_ref: e.ledger_ref.clone(),
                            confidence: MappingConfidence::Replay,
                        });
                    if hit.is_some() {
                        emit_mapping_resolved(
                            row.kind,
                            row.local_id,
                            MappingConfidence::Replay.as_str(),
                        );
                    }
                    Ok(hit)
                } else {
                    let refs: Vec<LedgerRef> =
                        entries.into_iter().map(|e| e.ledger_ref).collect();
                    self.positional(row, &refs).await
                }
            }
            Err(LedgerError::Unavailable(detail)) => {
                debug!(kind = %row.kind, id = %row.local_id, %detail, "ledger unreachable, replaying audit log");
                match self.refs_from_audit(row).await {
                    Some(refs) => self.positional(row, &refs).await,
                    None => Ok(None),
                }
            }
            Err(_) => Ok(None),
        }
    }

    /// Positional fallback: zip locally-known entities (creation order)
    /// against the candidate ref list (registration order).
    async fn positional(
        &self,
        row: &StoredEntity,
        refs: &[LedgerRef],
    ) -> Result<Option<ResolvedRef>> {
        let locals = self.relational.list(row.kind, row.team_id).await?;
        let position = locals.iter().position(|r| r.local_id == row.local_id);

        let hit = position
            .and_then(|i| refs.get(i))
            .map(|ledger_ref| ResolvedRef {
                ledger_ref: ledger_ref.clone(),
                confidence: MappingConfidence::Heuristic,
            });
        if hit.is_some() {
            emit_mapping_degraded(row.kind, row.local_id);
        }
        Ok(hit)
    }

    /// Rebuild the team's ref list from confirmed `register` audit
    /// records, in submission order. Used only while the ledger itself
    /// cannot be queried.
    async fn refs_from_audit(&self, row: &StoredEntity) -> Option<Vec<LedgerRef>> {
        let filter = AuditFilter {
            kind: Some(row.kind),
            method: Some("register".to_string()),
            outcome: Some(AuditOutcome::Confirmed),
        };
        let page = match self.audit.query(filter, 0, AUDIT_REPLAY_LIMIT).await {
            Ok(page) => page,
            Err(err) => {
                debug!(error = %err, "audit log unavailable for offline mapping");
                return None;
            }
        };

        // Queries are newest-first; submission order is the reverse.
        let refs: Vec<LedgerRef> = page
            .records
            .into_iter()
            .rev()
            .filter(|r| r.team_id == row.team_id)
            .filter_map(|r| r.entity_ref)
            .collect();
        if refs.is_empty() {
            None
        } else {
            Some(refs)
        }
    }
}
