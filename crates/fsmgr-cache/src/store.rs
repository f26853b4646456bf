//! SQLite implementation of IMetadataStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                        |
//! |-----------------|----------|-------------------------------------------------|
//! | ItemId          | INTEGER  | `AUTOINCREMENT` rowid, never reused             |
//! | CanonicalPath   | TEXT     | normalized `/` form                             |
//! | deleted_path    | TEXT     | absolute path, separators normalized to `/`     |
//! | DateTime<Utc>   | TEXT     | RFC 3339                                        |
//! | AuditAction     | TEXT     | `as_str()` / `FromStr`                          |
//! | AuditResult     | TEXT     | serde_json                                      |
//!
//! ## Prefix scans
//!
//! Subtree lookups use a half-open range on the path column instead of
//! `LIKE` (which is case-insensitive in SQLite and would need escaping):
//! every descendant of `p` sorts in `[p + "/", p + "0")` because `'0'` is
//! the character right after `'/'`. The range is served by the path index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use fsmgr_core::domain::{
    AuditAction, AuditEntry, AuditId, AuditResult, CanonicalPath, Item, ItemId, ItemParts,
    NewItem, OperationId,
};
use fsmgr_core::ports::{CommitOutcome, IMetadataStore, Mutation};

use crate::CacheError;

/// SQLite-backed metadata store
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Stored form of a filesystem path: `/` separators only
fn path_to_db(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Bounds of the half-open range holding every descendant of `prefix`
fn descendant_range(prefix: &str) -> (String, String) {
    let trimmed = prefix.trim_end_matches('/');
    (format!("{trimmed}/"), format!("{trimmed}0"))
}

fn size_to_db(size: u64) -> Result<i64, CacheError> {
    i64::try_from(size)
        .map_err(|_| CacheError::SerializationError(format!("size {size} exceeds i64")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn item_from_row(row: &SqliteRow) -> Result<Item, CacheError> {
    let id: i64 = row.try_get("id")?;
    let path_str: String = row.try_get("canonical_path")?;
    let size: i64 = row.try_get("size")?;
    let date_modified: String = row.try_get("date_modified")?;
    let expiry_date: Option<String> = row.try_get("expiry_date")?;
    let is_deleted: bool = row.try_get("is_deleted")?;
    let deleted_path: Option<String> = row.try_get("deleted_path")?;

    if is_deleted != deleted_path.is_some() {
        return Err(CacheError::SerializationError(format!(
            "item {id}: is_deleted={is_deleted} disagrees with deleted_path"
        )));
    }

    let canonical_path = CanonicalPath::parse(&path_str).map_err(|e| {
        CacheError::SerializationError(format!("item {id}: bad path '{path_str}': {e}"))
    })?;

    Item::from_parts(ItemParts {
        id: ItemId::new(id),
        canonical_path,
        size: u64::try_from(size).unwrap_or(0),
        date_modified: parse_datetime(&date_modified)?,
        owner: row.try_get("owner")?,
        modified_by: row.try_get("modified_by")?,
        issued_by: row.try_get("issued_by")?,
        expiry_date: parse_optional_datetime(expiry_date)?,
        is_folder: row.try_get("is_folder")?,
        deleted_path: deleted_path.map(PathBuf::from),
    })
    .map_err(|e| CacheError::SerializationError(format!("item {id}: {e}")))
}

fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, CacheError> {
    let id: i64 = row.try_get("id")?;
    let timestamp: String = row.try_get("timestamp")?;
    let operation_id: Option<String> = row.try_get("operation_id")?;
    let item_id: Option<i64> = row.try_get("item_id")?;
    let action_str: String = row.try_get("action")?;
    let result_str: String = row.try_get("result")?;
    let actor: Option<String> = row.try_get("actor")?;
    let details_str: Option<String> = row.try_get("details")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;

    let action: AuditAction = action_str
        .parse()
        .map_err(CacheError::SerializationError)?;
    let result: AuditResult = serde_json::from_str(&result_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid AuditResult '{}': {}", result_str, e))
    })?;
    let details = details_str
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    let mut entry = AuditEntry::new(action, result)
        .with_id(AuditId::new(id))
        .with_timestamp(parse_datetime(&timestamp)?)
        .with_details(details);
    if let Some(op) = operation_id.and_then(|s| s.parse::<OperationId>().ok()) {
        entry = entry.with_operation_id(op);
    }
    if let Some(item_id) = item_id {
        entry = entry.with_item_id(ItemId::new(item_id));
    }
    if let Some(actor) = actor {
        entry = entry.with_actor(actor);
    }
    if let Some(ms) = duration_ms {
        entry = entry.with_duration_ms(u64::try_from(ms).unwrap_or(0));
    }
    Ok(entry)
}

// ============================================================================
// Mutations (run inside one transaction)
// ============================================================================

async fn insert_item(conn: &mut SqliteConnection, new: NewItem) -> Result<Item, CacheError> {
    let result = sqlx::query(
        "INSERT INTO items \
         (name, canonical_path, size, date_modified, owner, modified_by, issued_by, \
          expiry_date, is_folder, is_deleted, deleted_path) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)",
    )
    .bind(new.name())
    .bind(new.canonical_path.as_str())
    .bind(size_to_db(new.size)?)
    .bind(new.date_modified.to_rfc3339())
    .bind(&new.owner)
    .bind(&new.modified_by)
    .bind(&new.issued_by)
    .bind(new.expiry_date.map(|d| d.to_rfc3339()))
    .bind(new.is_folder)
    .execute(&mut *conn)
    .await?;

    let id = ItemId::new(result.last_insert_rowid());
    new.into_item(id)
        .map_err(|e| CacheError::SerializationError(e.to_string()))
}

async fn update_item(conn: &mut SqliteConnection, item: &Item) -> Result<(), CacheError> {
    let result = sqlx::query(
        "UPDATE items SET \
         name = ?, canonical_path = ?, size = ?, date_modified = ?, owner = ?, \
         modified_by = ?, issued_by = ?, expiry_date = ?, is_folder = ?, \
         is_deleted = ?, deleted_path = ? \
         WHERE id = ?",
    )
    .bind(item.name())
    .bind(item.canonical_path().as_str())
    .bind(size_to_db(item.size())?)
    .bind(item.date_modified().to_rfc3339())
    .bind(item.owner())
    .bind(item.modified_by())
    .bind(item.issued_by())
    .bind(item.expiry_date().map(|d| d.to_rfc3339()))
    .bind(item.is_folder())
    .bind(item.is_deleted())
    .bind(item.deleted_path().map(path_to_db))
    .bind(item.id().as_i64())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CacheError::RecordNotFound(format!("update of item {}", item.id())));
    }
    Ok(())
}

async fn adjust_size(conn: &mut SqliteConnection, id: ItemId, delta: i64) -> Result<(), CacheError> {
    let result = sqlx::query("UPDATE items SET size = MAX(0, size + ?) WHERE id = ?")
        .bind(delta)
        .bind(id.as_i64())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CacheError::RecordNotFound(format!("size adjustment of item {id}")));
    }
    Ok(())
}

async fn delete_item(conn: &mut SqliteConnection, id: ItemId) -> Result<(), CacheError> {
    let result = sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id.as_i64())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CacheError::RecordNotFound(format!("delete of item {id}")));
    }
    Ok(())
}

// ============================================================================
// IMetadataStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMetadataStore for SqliteMetadataStore {
    async fn get(&self, path: &CanonicalPath) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE canonical_path = ? AND is_deleted = 0")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn get_by_id(&self, id: ItemId) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn find_by_prefix(&self, path: &CanonicalPath) -> anyhow::Result<Vec<Item>> {
        let rows = if path.is_root() {
            sqlx::query("SELECT * FROM items WHERE is_deleted = 0 ORDER BY canonical_path")
                .fetch_all(&self.pool)
                .await?
        } else {
            let (lower, upper) = descendant_range(path.as_str());
            sqlx::query(
                "SELECT * FROM items WHERE is_deleted = 0 \
                 AND (canonical_path = ? OR (canonical_path >= ? AND canonical_path < ?)) \
                 ORDER BY canonical_path",
            )
            .bind(path.as_str())
            .bind(&lower)
            .bind(&upper)
            .fetch_all(&self.pool)
            .await?
        };

        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::trace!(prefix = %path, count = items.len(), "Prefix scan");
        Ok(items)
    }

    async fn find_deleted_under(&self, deleted_path: &Path) -> anyhow::Result<Vec<Item>> {
        let exact = path_to_db(deleted_path);
        let (lower, upper) = descendant_range(&exact);
        let rows = sqlx::query(
            "SELECT * FROM items WHERE is_deleted = 1 \
             AND (deleted_path = ? OR (deleted_path >= ? AND deleted_path < ?)) \
             ORDER BY deleted_path",
        )
        .bind(&exact)
        .bind(&lower)
        .bind(&upper)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_deleted(&self) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE is_deleted = 1 ORDER BY date_modified DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> anyhow::Result<CommitOutcome> {
        let count = mutations.len();
        let mut tx = self.pool.begin().await?;
        let mut outcome = CommitOutcome::default();

        for mutation in mutations {
            let kind = mutation.kind();
            let applied = match mutation {
                Mutation::Insert(new) => insert_item(&mut tx, new).await.map(|item| {
                    outcome.inserted.push(item);
                }),
                Mutation::Update(item) => update_item(&mut tx, &item).await,
                Mutation::AdjustSize { id, delta } => adjust_size(&mut tx, id, delta).await,
                Mutation::Delete(id) => delete_item(&mut tx, id).await,
            };
            if let Err(e) = applied {
                tracing::debug!(kind, error = %e, "Mutation failed, rolling back transaction");
                // Dropping `tx` rolls the transaction back.
                return Err(e.into());
            }
        }

        tx.commit().await?;
        tracing::trace!(mutations = count, "Committed metadata batch");
        Ok(outcome)
    }

    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<AuditId> {
        let result = serde_json::to_string(entry.result())
            .map_err(|e| anyhow::anyhow!("Failed to serialize audit result: {}", e))?;
        let details = serde_json::to_string(entry.details())
            .map_err(|e| anyhow::anyhow!("Failed to serialize audit details: {}", e))?;

        let inserted = sqlx::query(
            "INSERT INTO audit_log \
             (timestamp, operation_id, item_id, action, result, actor, details, duration_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.timestamp().to_rfc3339())
        .bind(entry.operation_id().map(|o| o.to_string()))
        .bind(entry.item_id().map(|i| i.as_i64()))
        .bind(entry.action().as_str())
        .bind(&result)
        .bind(entry.actor())
        .bind(&details)
        .bind(entry.duration_ms().map(|d| d as i64))
        .execute(&self.pool)
        .await?;

        tracing::trace!(action = %entry.action(), "Saved audit entry");
        Ok(AuditId::new(inserted.last_insert_rowid()))
    }

    async fn get_audit_trail(&self, item_id: ItemId) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_log WHERE item_id = ? ORDER BY id ASC")
            .bind(item_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(audit_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE timestamp >= ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(since.to_rfc3339())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(audit_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
