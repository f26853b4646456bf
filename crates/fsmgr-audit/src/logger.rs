//! AuditLogger - high-level audit logging service
//!
//! Wraps `IMetadataStore::save_audit()`. All methods are non-fatal: a failed
//! audit write is logged via `tracing::warn!` and never propagated, since the
//! operation it describes has already settled.

use std::sync::Arc;

use fsmgr_core::{
    domain::{Actor, AuditEntry, AuditResult, ItemId, OperationId, OperationKind},
    ports::IMetadataStore,
};
use serde_json::json;

/// Failure code for an operation whose filesystem change was undone
pub const CODE_ROLLED_BACK: &str = "rolled_back";

/// Failure code for an operation left with filesystem and metadata disagreeing
pub const CODE_ROLLBACK_FAILED: &str = "rollback_failed";

/// Facts about one settled operation
#[derive(Debug, Clone)]
pub struct OperationRecord<'a> {
    pub operation: OperationId,
    pub kind: OperationKind,
    pub actor: &'a Actor,
    pub item_id: Option<ItemId>,
    /// Source location (canonical path or recycle path)
    pub from: Option<String>,
    /// Destination location
    pub to: Option<String>,
    pub duration_ms: u64,
}

impl OperationRecord<'_> {
    fn entry(&self, result: AuditResult) -> AuditEntry {
        let mut entry = AuditEntry::new(self.kind.audit_action(), result)
            .with_operation_id(self.operation)
            .with_actor(self.actor.name())
            .with_duration_ms(self.duration_ms)
            .with_details(json!({
                "from": self.from,
                "to": self.to,
            }));
        if let Some(id) = self.item_id {
            entry = entry.with_item_id(id);
        }
        entry
    }
}

/// Records settled engine operations in the metadata store
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn IMetadataStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn IMetadataStore>) -> Self {
        Self { store }
    }

    async fn save(&self, entry: &AuditEntry) {
        if let Err(e) = self.store.save_audit(entry).await {
            tracing::warn!(error = %e, action = %entry.action(), "Failed to save audit entry");
        }
    }

    /// Both sides applied.
    pub async fn log_committed(&self, record: &OperationRecord<'_>) {
        self.save(&record.entry(AuditResult::success())).await;
    }

    /// Metadata commit failed and the filesystem change was undone.
    pub async fn log_rolled_back(&self, record: &OperationRecord<'_>, cause: &str) {
        self.save(&record.entry(AuditResult::failed(CODE_ROLLED_BACK, cause)))
            .await;
    }

    /// Metadata commit failed and undoing the filesystem change failed too.
    pub async fn log_diverged(
        &self,
        record: &OperationRecord<'_>,
        cause: &str,
        rollback_error: &str,
    ) {
        let entry = record
            .entry(AuditResult::failed(
                CODE_ROLLBACK_FAILED,
                format!("{cause}; rollback failed: {rollback_error}"),
            ));
        let details = json!({
            "from": record.from,
            "to": record.to,
            "cause": cause,
            "rollback_error": rollback_error,
        });
        self.save(&entry.with_details(details)).await;
    }
}
