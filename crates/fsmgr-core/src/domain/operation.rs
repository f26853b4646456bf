//! Two-phase operation tracking
//!
//! Each mutating operation first changes the filesystem (Phase F) and then
//! commits the metadata (Phase M). The phase moves through:
//!
//! ```text
//!   Pending ──fs ok──► FilesystemApplied ──commit ok──► Committed
//!      │                  │           │
//!      │ fs failed        │ undo ok   │ undo failed
//!      ▼                  ▼           ▼
//!    Failed ◄──────── RolledBack    Diverged
//! ```
//!
//! `Committed`, `Failed` and `Diverged` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::audit::AuditAction;
use super::errors::DomainError;

/// The kind of logical operation being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateDirectory,
    Upload,
    Replace,
    Rename,
    SoftDelete,
    PermanentDelete,
    Restore,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateDirectory => "create_directory",
            OperationKind::Upload => "upload",
            OperationKind::Replace => "replace",
            OperationKind::Rename => "rename",
            OperationKind::SoftDelete => "soft_delete",
            OperationKind::PermanentDelete => "permanent_delete",
            OperationKind::Restore => "restore",
        }
    }

    /// Audit action recorded for this kind of operation
    pub fn audit_action(&self) -> AuditAction {
        match self {
            OperationKind::CreateDirectory => AuditAction::DirectoryCreate,
            OperationKind::Upload => AuditAction::FileUpload,
            OperationKind::Replace => AuditAction::FileReplace,
            OperationKind::Rename => AuditAction::Rename,
            OperationKind::SoftDelete => AuditAction::SoftDelete,
            OperationKind::PermanentDelete => AuditAction::PermanentDelete,
            OperationKind::Restore => AuditAction::Restore,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one operation through the two-phase protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    #[default]
    Pending,
    FilesystemApplied,
    Committed,
    RolledBack,
    Failed,
    Diverged,
}

impl OperationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            OperationPhase::Pending => "pending",
            OperationPhase::FilesystemApplied => "filesystem_applied",
            OperationPhase::Committed => "committed",
            OperationPhase::RolledBack => "rolled_back",
            OperationPhase::Failed => "failed",
            OperationPhase::Diverged => "diverged",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationPhase::Committed | OperationPhase::Failed | OperationPhase::Diverged
        )
    }

    pub fn can_transition_to(&self, target: OperationPhase) -> bool {
        use OperationPhase::*;
        matches!(
            (self, target),
            (Pending, FilesystemApplied)
                | (Pending, Failed)
                | (FilesystemApplied, Committed)
                | (FilesystemApplied, RolledBack)
                | (FilesystemApplied, Diverged)
                | (RolledBack, Failed)
        )
    }

    /// Move to `target`, rejecting transitions the protocol does not allow.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` for an illegal transition
    pub fn transition_to(&mut self, target: OperationPhase) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
