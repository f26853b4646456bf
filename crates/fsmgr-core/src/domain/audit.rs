//! Audit entry domain entities
//!
//! Every engine operation leaves one entry behind: committed operations as
//! successes, rolled-back and diverged ones as failures with the cause.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{AuditId, ItemId, OperationId};

/// Actions that can be recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A directory was created
    DirectoryCreate,
    /// A new file was uploaded
    FileUpload,
    /// An existing file was overwritten
    FileReplace,
    /// A file or directory was renamed
    Rename,
    /// An item was moved into the recycle area
    SoftDelete,
    /// A recycled item was removed for good
    PermanentDelete,
    /// A recycled item was moved back
    Restore,
}

impl AuditAction {
    /// Stable string form, also used as the database column value
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DirectoryCreate => "directory_create",
            AuditAction::FileUpload => "file_upload",
            AuditAction::FileReplace => "file_replace",
            AuditAction::Rename => "rename",
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::PermanentDelete => "permanent_delete",
            AuditAction::Restore => "restore",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory_create" => Ok(AuditAction::DirectoryCreate),
            "file_upload" => Ok(AuditAction::FileUpload),
            "file_replace" => Ok(AuditAction::FileReplace),
            "rename" => Ok(AuditAction::Rename),
            "soft_delete" => Ok(AuditAction::SoftDelete),
            "permanent_delete" => Ok(AuditAction::PermanentDelete),
            "restore" => Ok(AuditAction::Restore),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// Result of an audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// Both filesystem and metadata were updated
    Success,
    /// The action failed; `code` distinguishes rolled back from diverged
    Failed {
        /// Error code for categorization
        code: String,
        /// Human-readable error message
        message: String,
    },
}

impl AuditResult {
    /// Creates a successful result
    pub fn success() -> Self {
        AuditResult::Success
    }

    /// Creates a failed result with the given code and message
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        AuditResult::Failed {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuditResult::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AuditResult::Failed { .. })
    }
}

/// An audit log entry recording one engine operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned by the store on persist
    id: Option<AuditId>,
    timestamp: DateTime<Utc>,
    operation_id: Option<OperationId>,
    item_id: Option<ItemId>,
    action: AuditAction,
    result: AuditResult,
    /// Who performed the action
    actor: Option<String>,
    details: Value,
    duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Creates a new audit entry with the required fields
    ///
    /// # Example
    ///
    /// ```
    /// use fsmgr_core::domain::audit::{AuditAction, AuditEntry, AuditResult};
    ///
    /// let entry = AuditEntry::new(AuditAction::Rename, AuditResult::success());
    /// assert!(entry.result().is_success());
    /// assert!(entry.id().is_none());
    /// ```
    pub fn new(action: AuditAction, result: AuditResult) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            operation_id: None,
            item_id: None,
            action,
            result,
            actor: None,
            details: Value::Null,
            duration_ms: None,
        }
    }

    pub fn id(&self) -> Option<AuditId> {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn operation_id(&self) -> Option<OperationId> {
        self.operation_id
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn result(&self) -> &AuditResult {
        &self.result
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn details(&self) -> &Value {
        &self.details
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Sets the ID (called after the database insert)
    pub fn with_id(mut self, id: AuditId) -> Self {
        self.id = Some(id);
        self
    }

    /// Overrides the timestamp (used when reading back from storage)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    pub fn with_item_id(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
