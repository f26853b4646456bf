//! fsmgr Sync - Transactional filesystem/metadata synchronization
//!
//! Provides:
//! - Two-phase operations: filesystem change first, metadata commit second
//! - Rollback of the filesystem change when the commit fails
//! - Subtree locking so overlapping operations never interleave
//! - Name-conflict suggestions for occupied destinations
//!
//! ## Modules
//!
//! - [`engine`] - `SyncEngine`, the operation orchestrator
//! - [`filesystem`] - Local filesystem adapter with undoable moves and writes
//! - [`locks`] - Path-subtree lock table

pub mod engine;
pub mod filesystem;
pub mod locks;

use std::path::PathBuf;

use fsmgr_conflict::NamingError;
use fsmgr_core::domain::{DomainError, ItemId, OperationId, OperationKind};
use fsmgr_core::ports::MoverError;
use thiserror::Error;

pub use engine::{BatchConflict, BatchUpload, FileUpload, ItemInfo, SyncEngine};
pub use filesystem::LocalFileSystemMover;
pub use locks::{LockKey, LockMode, LockScope, SubtreeGuard, SubtreeLocks};

/// Errors returned by [`SyncEngine`] operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The user path is malformed or escapes the managed root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A new name is not a valid single segment
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Nothing exists at the given location
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record exists but is not in the recycle bin
    #[error("Item {0} is not in the recycle bin")]
    NotInRecycleBin(ItemId),

    /// The destination is occupied
    #[error("Destination already exists: {path}")]
    Conflict {
        path: String,
        /// First free alternative name, when one was computed
        suggested_name: Option<String>,
    },

    /// No free suffixed name within the configured cap
    #[error("No free name for {name:?} after {max} attempts")]
    TooManyConflicts { name: String, max: u32 },

    /// Uploads must carry data
    #[error("File is empty: {0}")]
    EmptyFile(String),

    /// The entry exists on disk but has no metadata record
    #[error("No metadata record for {0}")]
    MetadataMissing(String),

    /// The metadata commit failed and undoing the filesystem change failed
    /// as well. Filesystem and metadata now disagree.
    #[error(
        "{kind} {operation} left filesystem and metadata inconsistent: {cause}; rollback failed: {rollback_error}"
    )]
    RollbackFailed {
        operation: OperationId,
        kind: OperationKind,
        item_id: Option<ItemId>,
        from_path: PathBuf,
        to_path: PathBuf,
        cause: String,
        rollback_error: String,
    },

    /// Metadata store failure
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Filesystem failure
    #[error("Filesystem error: {0}")]
    Io(#[from] MoverError),

    /// A domain-level error propagated from fsmgr-core
    #[error("Domain error: {0}")]
    Domain(DomainError),

    /// The operation task was aborted or panicked
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Stable machine-readable code, used in audit entries and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InvalidPath(_) => "invalid_path",
            SyncError::InvalidName(_) => "invalid_name",
            SyncError::NotFound(_) => "not_found",
            SyncError::NotInRecycleBin(_) => "not_in_recycle_bin",
            SyncError::Conflict { .. } => "conflict",
            SyncError::TooManyConflicts { .. } => "too_many_conflicts",
            SyncError::EmptyFile(_) => "empty_file",
            SyncError::MetadataMissing(_) => "metadata_missing",
            SyncError::RollbackFailed { .. } => "rollback_failed",
            SyncError::Storage(_) => "storage",
            SyncError::Io(_) => "io",
            SyncError::Domain(_) => "domain",
            SyncError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidPath(p) | DomainError::PathOutsideRoot(p) => {
                SyncError::InvalidPath(p)
            }
            DomainError::InvalidName(n) => SyncError::InvalidName(n),
            other => SyncError::Domain(other),
        }
    }
}

impl From<NamingError> for SyncError {
    fn from(err: NamingError) -> Self {
        match err {
            NamingError::TooManyConflicts { name, max } => {
                SyncError::TooManyConflicts { name, max }
            }
            NamingError::InvalidName(e) => e.into(),
        }
    }
}
