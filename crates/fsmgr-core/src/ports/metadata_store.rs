//! Metadata store port (driven/secondary port)
//!
//! Persistent mapping from canonical path to [`Item`] records, plus the
//! audit trail.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Writes go through [`IMetadataStore::commit`], which applies a whole
//!   batch of [`Mutation`]s atomically: either every mutation lands or none.
//! - Paths are compared in their canonical (forward-slash) form, so lookups
//!   with `\` separators find the same records.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::{AuditEntry, AuditId, CanonicalPath, Item, ItemId, NewItem};

/// One change inside an atomic commit
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create a record; the store assigns the id
    Insert(NewItem),
    /// Overwrite every field of an existing record
    Update(Item),
    /// Add `delta` bytes to a record's size (clamped at zero)
    AdjustSize { id: ItemId, delta: i64 },
    /// Remove a record for good
    Delete(ItemId),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update(_) => "update",
            Mutation::AdjustSize { .. } => "adjust_size",
            Mutation::Delete(_) => "delete",
        }
    }
}

/// What a successful commit produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    /// Records created by `Insert` mutations, in submission order
    pub inserted: Vec<Item>,
}

/// Port trait for metadata persistence
#[async_trait::async_trait]
pub trait IMetadataStore: Send + Sync {
    /// The live (non-deleted) record at `path`
    async fn get(&self, path: &CanonicalPath) -> anyhow::Result<Option<Item>>;

    /// Any record by id, live or deleted
    async fn get_by_id(&self, id: ItemId) -> anyhow::Result<Option<Item>>;

    /// Live records at `path` or below it. The root matches everything.
    async fn find_by_prefix(&self, path: &CanonicalPath) -> anyhow::Result<Vec<Item>>;

    /// Deleted records whose `deleted_path` is `deleted_path` or lies under it
    async fn find_deleted_under(&self, deleted_path: &Path) -> anyhow::Result<Vec<Item>>;

    /// Every deleted record, most recently modified first
    async fn list_deleted(&self) -> anyhow::Result<Vec<Item>>;

    /// Apply all `mutations` in one transaction.
    ///
    /// # Errors
    /// Fails without applying anything if any mutation fails, including an
    /// `Update`, `AdjustSize` or `Delete` that targets a missing record.
    async fn commit(&self, mutations: Vec<Mutation>) -> anyhow::Result<CommitOutcome>;

    /// Append an audit entry, returning its assigned id
    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<AuditId>;

    /// Audit entries for one item, oldest first
    async fn get_audit_trail(&self, item_id: ItemId) -> anyhow::Result<Vec<AuditEntry>>;

    /// Audit entries since `since`, newest first, at most `limit`
    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>>;
}
