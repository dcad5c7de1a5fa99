//! Trait contract tests for RelationalStore, LedgerGateway, and AuditLog.
//!
//! These verify the behavioral contracts using the in-memory fakes. Any
//! conforming backend must pass the same assertions.

use chrono::Utc;
use serde_json::json;

use scrumsync_stores::fakes::{
    GatewayCall, MemoryAuditLog, MemoryLedger, MemoryRelationalStore, ScriptedFailure,
};
use scrumsync_stores::{
    AuditFilter, AuditLog, AuditOutcome, AuditRecord, EntityKind, Fingerprint, LedgerError,
    LedgerGateway, LedgerRef, LocalId, RelationalStore, StoreError, SubmissionHandle,
};

fn fp(seed: &str) -> Fingerprint {
    Fingerprint::from_bytes(seed.as_bytes())
}

// ===========================================================================
// RelationalStore contract tests
// ===========================================================================

#[tokio::test]
async fn insert_assigns_fresh_local_ids() {
    let store = MemoryRelationalStore::new();
    let a = store
        .insert(EntityKind::Team, None, json!({"name": "core"}))
        .await
        .unwrap();
    let b = store
        .insert(EntityKind::Team, None, json!({"name": "platform"}))
        .await
        .unwrap();

    assert_ne!(a.local_id, b.local_id);
    assert!(a.ledger_ref.is_none());
    assert!(a.ledger_fingerprint.is_none());
}

#[tokio::test]
async fn child_insert_requires_owning_team() {
    let store = MemoryRelationalStore::new();
    let err = store
        .insert(EntityKind::Task, None, json!({"title": "orphan"}))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Rejected { .. }));
}

#[tokio::test]
async fn update_replaces_fields_and_round_trips() {
    let store = MemoryRelationalStore::new();
    let row = store
        .insert(EntityKind::Team, None, json!({"name": "core"}))
        .await
        .unwrap();

    let updated = store
        .update(EntityKind::Team, row.local_id, json!({"name": "core-infra"}))
        .await
        .unwrap();
    assert_eq!(updated.fields["name"], "core-infra");

    let fetched = store.fetch(EntityKind::Team, row.local_id).await.unwrap();
    assert_eq!(fetched.fields["name"], "core-infra");
}

#[tokio::test]
async fn update_missing_row_is_not_found() {
    let store = MemoryRelationalStore::new();
    let err = store
        .update(EntityKind::Sprint, LocalId(404), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn delete_is_tombstoning() {
    let store = MemoryRelationalStore::new();
    let row = store
        .insert(EntityKind::Team, None, json!({"name": "gone"}))
        .await
        .unwrap();

    store.delete(EntityKind::Team, row.local_id).await.unwrap();
    let err = store.fetch(EntityKind::Team, row.local_id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn list_scopes_to_team_in_creation_order() {
    let store = MemoryRelationalStore::new();
    let team_a = store
        .insert(EntityKind::Team, None, json!({"name": "a"}))
        .await
        .unwrap();
    let team_b = store
        .insert(EntityKind::Team, None, json!({"name": "b"}))
        .await
        .unwrap();

    let first = store
        .insert(EntityKind::Task, Some(team_a.local_id), json!({"title": "1"}))
        .await
        .unwrap();
    store
        .insert(EntityKind::Task, Some(team_b.local_id), json!({"title": "other"}))
        .await
        .unwrap();
    let second = store
        .insert(EntityKind::Task, Some(team_a.local_id), json!({"title": "2"}))
        .await
        .unwrap();

    let tasks = store
        .list(EntityKind::Task, Some(team_a.local_id))
        .await
        .unwrap();
    let ids: Vec<LocalId> = tasks.iter().map(|t| t.local_id).collect();
    assert_eq!(ids, vec![first.local_id, second.local_id]);
}

#[tokio::test]
async fn ledger_link_is_append_only() {
    let store = MemoryRelationalStore::new();
    let row = store
        .insert(EntityKind::BacklogItem, Some(LocalId(1)), json!({"title": "x"}))
        .await
        .unwrap();

    let seven = LedgerRef::from("7");
    store
        .record_ledger_link(EntityKind::BacklogItem, row.local_id, &seven, &fp("v1"))
        .await
        .unwrap();

    // Refreshing the fingerprint under the same ref is bookkeeping, not
    // a reassignment.
    store
        .record_ledger_link(EntityKind::BacklogItem, row.local_id, &seven, &fp("v2"))
        .await
        .unwrap();

    let err = store
        .record_ledger_link(
            EntityKind::BacklogItem,
            row.local_id,
            &LedgerRef::from("8"),
            &fp("v3"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LedgerRefConflict { .. }));

    let fetched = store
        .fetch(EntityKind::BacklogItem, row.local_id)
        .await
        .unwrap();
    assert_eq!(fetched.ledger_ref, Some(seven));
    assert_eq!(fetched.ledger_fingerprint, Some(fp("v2")));
}

#[tokio::test]
async fn queued_failure_surfaces_once() {
    let store = MemoryRelationalStore::new();
    store.queue_failure(StoreError::Network("scripted".to_string()));

    let err = store
        .insert(EntityKind::Team, None, json!({"name": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Network(_)));

    // Next call goes through.
    store
        .insert(EntityKind::Team, None, json!({"name": "x"}))
        .await
        .unwrap();
}

// ===========================================================================
// LedgerGateway contract tests
// ===========================================================================

#[tokio::test]
async fn register_confirms_with_fresh_ref() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));

    let op = ledger
        .register(
            EntityKind::Sprint,
            Some(&team_ref),
            json!({"name": "sprint 1"}),
            &fp("sprint 1"),
        )
        .await
        .unwrap();
    let receipt = op.confirm().await.unwrap();

    assert!(receipt.block > 0);
    assert!(receipt.cost > 0);
    let members = ledger
        .team_members(EntityKind::Sprint, &team_ref)
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].ledger_ref, receipt.confirmed_ref);
    assert_eq!(members[0].fingerprint, Some(fp("sprint 1")));
}

#[tokio::test]
async fn child_register_without_parent_reverts() {
    let ledger = MemoryLedger::new();
    let op = ledger
        .register(EntityKind::Task, None, json!({}), &fp("t"))
        .await
        .unwrap();
    let err = op.confirm().await.unwrap_err();
    assert!(matches!(err, LedgerError::Reverted { .. }));
}

#[tokio::test]
async fn update_fingerprint_replaces_on_ledger_value() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));
    let item_ref = ledger.seed_entry(EntityKind::BacklogItem, Some(&team_ref), Some(fp("v1")));

    ledger
        .update_fingerprint(EntityKind::BacklogItem, &item_ref, &fp("v2"))
        .await
        .unwrap()
        .confirm()
        .await
        .unwrap();

    let members = ledger
        .team_members(EntityKind::BacklogItem, &team_ref)
        .await
        .unwrap();
    assert_eq!(members[0].fingerprint, Some(fp("v2")));
}

#[tokio::test]
async fn unknown_entity_reverts() {
    let ledger = MemoryLedger::new();
    let err = ledger
        .update_fingerprint(EntityKind::Task, &LedgerRef::from("999"), &fp("x"))
        .await
        .unwrap()
        .confirm()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Reverted {
            reason: "unknown entity".to_string()
        }
    );
}

#[tokio::test]
async fn remove_tombstones_and_double_remove_reverts() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));
    let task_ref = ledger.seed_entry(EntityKind::Task, Some(&team_ref), Some(fp("t")));

    ledger
        .remove(EntityKind::Task, &task_ref)
        .await
        .unwrap()
        .confirm()
        .await
        .unwrap();
    assert_eq!(ledger.is_removed(EntityKind::Task, &task_ref), Some(true));
    assert!(ledger
        .team_members(EntityKind::Task, &team_ref)
        .await
        .unwrap()
        .is_empty());

    let err = ledger
        .remove(EntityKind::Task, &task_ref)
        .await
        .unwrap()
        .confirm()
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Reverted { .. }));
}

#[tokio::test]
async fn scripted_decline_surfaces_on_confirmation_without_side_effect() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));
    ledger.script_failure(ScriptedFailure::Decline);

    let op = ledger
        .register(EntityKind::Sprint, Some(&team_ref), json!({}), &fp("s"))
        .await
        .unwrap();
    assert_eq!(op.confirm().await.unwrap_err(), LedgerError::Declined);

    assert!(ledger
        .team_members(EntityKind::Sprint, &team_ref)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn scripted_outage_fails_the_submission_itself() {
    let ledger = MemoryLedger::new();
    ledger.script_failure(ScriptedFailure::Unavailable);

    let err = ledger
        .register(EntityKind::Team, None, json!({}), &fp("team"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

#[tokio::test]
async fn offline_ledger_fails_reads_too() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));
    ledger.set_offline(true);

    let err = ledger
        .team_members(EntityKind::Task, &team_ref)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

#[tokio::test]
async fn fingerprints_can_be_withheld() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));
    ledger.seed_entry(EntityKind::Task, Some(&team_ref), Some(fp("t")));
    ledger.set_serve_fingerprints(false);

    let members = ledger
        .team_members(EntityKind::Task, &team_ref)
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].fingerprint.is_none());
}

#[tokio::test]
async fn gateway_calls_are_recorded() {
    let ledger = MemoryLedger::new();
    let team_ref = ledger.seed_entry(EntityKind::Team, None, Some(fp("team")));

    ledger
        .register(EntityKind::Sprint, Some(&team_ref), json!({}), &fp("s"))
        .await
        .unwrap()
        .confirm()
        .await
        .unwrap();
    ledger
        .team_members(EntityKind::Sprint, &team_ref)
        .await
        .unwrap();

    assert_eq!(ledger.calls().len(), 2);
    assert_eq!(
        ledger.submissions(),
        vec![GatewayCall {
            kind: EntityKind::Sprint,
            method: "register".to_string(),
            entity: None,
        }]
    );
}

// ===========================================================================
// AuditLog contract tests
// ===========================================================================

fn audit_record(kind: EntityKind, method: &str, outcome: AuditOutcome) -> AuditRecord {
    AuditRecord {
        handle: SubmissionHandle::generate(),
        contract: "sprint_registry".to_string(),
        method: method.to_string(),
        kind,
        local_id: LocalId(1),
        team_id: None,
        outcome,
        entity_ref: None,
        cost: Some(21),
        block: Some(1001),
        description: format!("{method} {kind}"),
        recorded_at: Utc::now(),
    }
}

#[tokio::test]
async fn audit_query_is_newest_first() {
    let log = MemoryAuditLog::new();
    log.append(audit_record(
        EntityKind::Sprint,
        "register",
        AuditOutcome::Confirmed,
    ))
    .await
    .unwrap();
    log.append(audit_record(
        EntityKind::Sprint,
        "change_status",
        AuditOutcome::Confirmed,
    ))
    .await
    .unwrap();

    let page = log.query(AuditFilter::default(), 0, 10).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.records[0].method, "change_status");
    assert_eq!(page.records[1].method, "register");
}

#[tokio::test]
async fn audit_filters_and_paginates() {
    let log = MemoryAuditLog::new();
    for _ in 0..3 {
        log.append(audit_record(
            EntityKind::Task,
            "register",
            AuditOutcome::Confirmed,
        ))
        .await
        .unwrap();
    }
    log.append(audit_record(
        EntityKind::Task,
        "remove",
        AuditOutcome::Declined,
    ))
    .await
    .unwrap();

    let filter = AuditFilter {
        kind: Some(EntityKind::Task),
        method: Some("register".to_string()),
        outcome: None,
    };
    let page = log.query(filter.clone(), 0, 2).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.records.len(), 2);

    let rest = log.query(filter, 2, 2).await.unwrap();
    assert_eq!(rest.records.len(), 1);
}

#[tokio::test]
async fn audit_purge_clears_everything() {
    let log = MemoryAuditLog::new();
    log.append(audit_record(
        EntityKind::Team,
        "register",
        AuditOutcome::Confirmed,
    ))
    .await
    .unwrap();

    assert_eq!(log.purge().await.unwrap(), 1);
    let page = log.query(AuditFilter::default(), 0, 10).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn audit_append_failure_is_reportable() {
    let log = MemoryAuditLog::new();
    log.set_fail_appends(true);

    let err = log
        .append(audit_record(
            EntityKind::Team,
            "register",
            AuditOutcome::Confirmed,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Network(_)));
}
