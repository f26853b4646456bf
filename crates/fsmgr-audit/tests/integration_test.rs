//! Integration test: AuditLogger -> SQLite -> query back

use std::sync::Arc;

use chrono::{Duration, Utc};
use fsmgr_audit::{AuditLogger, OperationRecord, CODE_ROLLBACK_FAILED, CODE_ROLLED_BACK};
use fsmgr_cache::{DatabasePool, SqliteMetadataStore};
use fsmgr_core::{
    domain::{Actor, AuditAction, AuditResult, ItemId, OperationId, OperationKind},
    ports::IMetadataStore,
};

async fn make_store() -> Arc<SqliteMetadataStore> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteMetadataStore::new(pool.pool().clone()))
}

fn record(actor: &Actor, kind: OperationKind) -> OperationRecord<'_> {
    OperationRecord {
        operation: OperationId::new(),
        kind,
        actor,
        item_id: Some(ItemId::new(5)),
        from: Some("docs".to_string()),
        to: Some("archive".to_string()),
        duration_ms: 3,
    }
}

#[tokio::test]
async fn test_committed_and_failed_entries_are_persisted() {
    let store = make_store().await;
    let logger = AuditLogger::new(Arc::clone(&store) as Arc<dyn IMetadataStore>);
    let actor = Actor::new("alice").unwrap();

    logger.log_committed(&record(&actor, OperationKind::Rename)).await;
    logger
        .log_rolled_back(&record(&actor, OperationKind::SoftDelete), "disk full")
        .await;
    logger
        .log_diverged(
            &record(&actor, OperationKind::Restore),
            "commit failed",
            "permission denied",
        )
        .await;

    let trail = store.get_audit_trail(ItemId::new(5)).await.unwrap();
    assert_eq!(trail.len(), 3);

    assert_eq!(trail[0].action(), AuditAction::Rename);
    assert!(trail[0].result().is_success());
    assert_eq!(trail[0].actor(), Some("alice"));
    assert_eq!(trail[0].details()["to"], "archive");

    assert_eq!(trail[1].action(), AuditAction::SoftDelete);
    assert_eq!(
        trail[1].result(),
        &AuditResult::failed(CODE_ROLLED_BACK, "disk full")
    );

    assert_eq!(trail[2].action(), AuditAction::Restore);
    match trail[2].result() {
        AuditResult::Failed { code, message } => {
            assert_eq!(code, CODE_ROLLBACK_FAILED);
            assert!(message.contains("permission denied"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(trail[2].details()["rollback_error"], "permission denied");

    let since = store
        .get_audit_since(Utc::now() - Duration::minutes(1), 10)
        .await
        .unwrap();
    assert_eq!(since.len(), 3);
}
