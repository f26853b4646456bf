//! Filesystem mover port (driven/secondary port)
//!
//! Physical create/write/move/delete operations on the real filesystem.
//! Every mutating call hands back a receipt describing exactly what it
//! changed, so the caller can undo it when the metadata commit fails, or
//! finalize it once the commit succeeded.
//!
//! ## Design Notes
//!
//! - Errors are typed ([`MoverError`]) because the engine branches on them:
//!   an occupied destination becomes a naming conflict, a missing source
//!   becomes `NotFound`.
//! - Overwrites never destroy data before the commit: the occupying entry is
//!   renamed aside (`displaced`) and only discarded by `finalize_*`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by filesystem mover implementations
#[derive(Debug, Error)]
pub enum MoverError {
    /// Nothing exists at the move source
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Move destination exists and overwrite was not requested
    #[error("Destination already occupied: {}", .0.display())]
    DestinationOccupied(PathBuf),

    /// Create target exists
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Target (or its parent) does not exist
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other I/O failure
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MoverError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MoverError::Io {
            path: path.into(),
            source,
        }
    }

    /// The path the error refers to
    pub fn path(&self) -> &Path {
        match self {
            MoverError::SourceNotFound(p)
            | MoverError::DestinationOccupied(p)
            | MoverError::AlreadyExists(p)
            | MoverError::NotFound(p) => p,
            MoverError::Io { path, .. } => path,
        }
    }
}

/// Snapshot of a path on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    pub exists: bool,
    pub is_dir: bool,
    /// File length in bytes (0 for directories)
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl EntryState {
    /// State of a path with nothing on it
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_dir: false,
            size: 0,
            created: None,
            modified: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.exists && !self.is_dir
    }

    pub fn is_directory(&self) -> bool {
        self.exists && self.is_dir
    }
}

/// Record of a completed move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReceipt {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Where an overwritten destination entry was set aside
    pub displaced: Option<PathBuf>,
    /// Missing ancestors of `destination` created for the move, outermost first
    pub created_dirs: Vec<PathBuf>,
}

/// Record of a completed file write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub path: PathBuf,
    /// Where the previous file was set aside on overwrite
    pub displaced: Option<PathBuf>,
}

/// Port trait for physical filesystem mutation
#[async_trait::async_trait]
pub trait IFileSystemMover: Send + Sync {
    /// Inspect a path; never fails for a missing path
    async fn stat(&self, path: &Path) -> Result<EntryState, MoverError>;

    /// Create a single directory.
    ///
    /// # Errors
    /// `AlreadyExists` when occupied, `NotFound` when the parent is missing
    async fn create_dir(&self, path: &Path) -> Result<(), MoverError>;

    /// Write a whole file.
    ///
    /// Without `overwrite` an existing file yields `AlreadyExists`; with it,
    /// the old file is displaced. The parent must exist (`NotFound`).
    async fn write_file(
        &self,
        path: &Path,
        data: &[u8],
        overwrite: bool,
    ) -> Result<WriteReceipt, MoverError>;

    /// Move a file or directory, creating missing parents of `destination`.
    ///
    /// # Errors
    /// `SourceNotFound` if nothing is at `source`; `DestinationOccupied` if
    /// `destination` exists and `overwrite` is false.
    async fn move_entry(
        &self,
        source: &Path,
        destination: &Path,
        overwrite: bool,
    ) -> Result<MoveReceipt, MoverError>;

    /// Remove a file or an empty directory, or with `recursive` a whole tree.
    ///
    /// # Errors
    /// `NotFound` if nothing exists at `path`
    async fn delete(&self, path: &Path, recursive: bool) -> Result<(), MoverError>;

    /// Total size of the files at or under `path`
    async fn dir_size(&self, path: &Path) -> Result<u64, MoverError>;

    /// Undo a move: put the entry back, restore the displaced entry and
    /// remove directories created for the move.
    async fn revert_move(&self, receipt: &MoveReceipt) -> Result<(), MoverError>;

    /// Undo a write: remove the new file and restore the displaced one.
    async fn revert_write(&self, receipt: &WriteReceipt) -> Result<(), MoverError>;

    /// Drop whatever a committed move or write set aside.
    async fn discard_displaced(&self, displaced: &Path) -> Result<(), MoverError>;
}
