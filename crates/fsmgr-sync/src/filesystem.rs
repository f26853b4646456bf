//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`IFileSystemMover`] using `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **Nothing is destroyed before commit**: an overwritten entry is renamed
//!   to a hidden sibling (`.<name>.fsmgr-displaced-<id>`) and only removed by
//!   `discard_displaced` once the metadata commit has succeeded.
//! - **Cross-device moves**: `rename(2)` failing with `EXDEV` falls back to
//!   copy + remove on a blocking thread. A finished copy is kept even if
//!   the source cannot be fully removed.
//! - **Self-cleaning failures**: a move or write that fails half-way undoes
//!   its own partial work before returning the error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fsmgr_core::ports::{EntryState, IFileSystemMover, MoveReceipt, MoverError, WriteReceipt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Adapter that bridges the [`IFileSystemMover`] port to the real filesystem.
///
/// Zero-sized: every operation takes absolute paths, the managed and recycle
/// roots live in the engine's `PathResolver`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemMover;

impl LocalFileSystemMover {
    /// Create a new `LocalFileSystemMover`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_not_found(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENOTDIR)
}

/// Hidden sibling used to park an entry that is being overwritten
fn displaced_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tag = Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(".{}.fsmgr-displaced-{}", name, &tag[..8]))
}

async fn rename(from: &Path, to: &Path) -> Result<(), MoverError> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|e| MoverError::io(from, e))
}

/// Rename, falling back to copy + remove across filesystems
async fn relocate(from: &Path, to: &Path) -> Result<(), MoverError> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!(from = %from.display(), to = %to.display(), "cross-device move, copying");
            let (src, dst) = (from.to_path_buf(), to.to_path_buf());
            tokio::task::spawn_blocking(move || copy_then_remove(&src, &dst))
                .await
                .map_err(|e| MoverError::io(from, std::io::Error::new(ErrorKind::Other, e)))?
                .map_err(|e| MoverError::io(from, e))
        }
        Err(e) if is_not_found(&e) => Err(MoverError::SourceNotFound(from.to_path_buf())),
        Err(e) => Err(MoverError::io(from, e)),
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> std::io::Result<()> {
    copy_then_remove_with(src, dst, remove_any)
}

/// Copy `src` to `dst`, then remove `src` with `remove_source`.
///
/// Once the copy is complete `dst` is the only guaranteed whole copy and is
/// never deleted. Leftovers of a partially removed source are logged.
fn copy_then_remove_with<R>(src: &Path, dst: &Path, remove_source: R) -> std::io::Result<()>
where
    R: FnOnce(&Path) -> std::io::Result<()>,
{
    if std::fs::symlink_metadata(dst).is_ok() {
        return Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("{} already exists", dst.display()),
        ));
    }
    if let Err(e) = copy_tree(src, dst) {
        match remove_any(dst) {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {}
            Err(cleanup) => warn!(
                path = %dst.display(),
                error = %cleanup,
                "failed to remove partial cross-device copy"
            ),
        }
        return Err(e);
    }
    if let Err(e) = remove_source(src) {
        warn!(
            source = %src.display(),
            destination = %dst.display(),
            error = %e,
            "cross-device move copied but left part of the source behind"
        );
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(src)?;
    if meta.is_dir() {
        std::fs::create_dir(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(src, dst).map(|_| ())
    }
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn tree_size(path: &Path) -> std::io::Result<u64> {
    let meta = std::fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += tree_size(&entry?.path())?;
    }
    Ok(total)
}

/// Create the missing ancestors of `path`, returning them outermost first.
///
/// On failure every directory created so far is removed again.
async fn create_parents(path: &Path) -> Result<Vec<PathBuf>, MoverError> {
    let mut missing = Vec::new();
    let mut cursor = path.parent();
    while let Some(dir) = cursor {
        match tokio::fs::symlink_metadata(dir).await {
            Ok(meta) if meta.is_dir() => break,
            Ok(_) => return Err(MoverError::NotFound(dir.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                missing.push(dir.to_path_buf());
                cursor = dir.parent();
            }
            Err(e) => return Err(MoverError::io(dir, e)),
        }
    }
    missing.reverse();

    for (i, dir) in missing.iter().enumerate() {
        if let Err(e) = tokio::fs::create_dir(dir).await {
            if e.kind() == ErrorKind::AlreadyExists {
                continue;
            }
            remove_created(&missing[..i]).await;
            return Err(MoverError::io(dir, e));
        }
    }
    Ok(missing)
}

/// Best-effort removal of directories created for a move, innermost first
async fn remove_created(created: &[PathBuf]) {
    for dir in created.iter().rev() {
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            warn!(path = %dir.display(), error = %e, "could not remove created directory");
        }
    }
}

/// Put a displaced entry back, logging when that is impossible
async fn restore_displaced(displaced: Option<&Path>, original: &Path) {
    if let Some(aside) = displaced {
        if let Err(e) = tokio::fs::rename(aside, original).await {
            warn!(
                displaced = %aside.display(),
                path = %original.display(),
                error = %e,
                "could not restore displaced entry"
            );
        }
    }
}

// ============================================================================
// IFileSystemMover implementation
// ============================================================================

#[async_trait::async_trait]
impl IFileSystemMover for LocalFileSystemMover {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn stat(&self, path: &Path) -> Result<EntryState, MoverError> {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if is_not_found(&e) => {
                debug!("path not found");
                return Ok(EntryState::not_found());
            }
            Err(e) => return Err(MoverError::io(path, e)),
        };

        let is_dir = meta.is_dir();
        Ok(EntryState {
            exists: true,
            is_dir,
            size: if is_dir { 0 } else { meta.len() },
            created: meta.created().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_dir(&self, path: &Path) -> Result<(), MoverError> {
        match tokio::fs::create_dir(path).await {
            Ok(()) => {
                debug!("directory created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(MoverError::AlreadyExists(path.to_path_buf()))
            }
            Err(e) if is_not_found(&e) => Err(MoverError::NotFound(
                path.parent().unwrap_or(path).to_path_buf(),
            )),
            Err(e) => Err(MoverError::io(path, e)),
        }
    }

    #[instrument(skip(self, data), fields(path = %path.display(), bytes = data.len()))]
    async fn write_file(
        &self,
        path: &Path,
        data: &[u8],
        overwrite: bool,
    ) -> Result<WriteReceipt, MoverError> {
        let parent = path
            .parent()
            .ok_or_else(|| MoverError::NotFound(path.to_path_buf()))?;
        if !self.stat(parent).await?.is_directory() {
            return Err(MoverError::NotFound(parent.to_path_buf()));
        }

        let existing = self.stat(path).await?;
        let displaced = if existing.exists {
            if !overwrite || existing.is_dir {
                return Err(MoverError::AlreadyExists(path.to_path_buf()));
            }
            let aside = displaced_path(path);
            debug!(displaced = %aside.display(), "setting existing file aside");
            rename(path, &aside).await?;
            Some(aside)
        } else {
            None
        };

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                restore_displaced(displaced.as_deref(), path).await;
                return Err(if e.kind() == ErrorKind::AlreadyExists {
                    MoverError::AlreadyExists(path.to_path_buf())
                } else {
                    MoverError::io(path, e)
                });
            }
        };

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                warn!(error = %cleanup, "could not remove partial file");
            }
            restore_displaced(displaced.as_deref(), path).await;
            return Err(MoverError::io(path, e));
        }

        debug!("write complete");
        Ok(WriteReceipt {
            path: path.to_path_buf(),
            displaced,
        })
    }

    #[instrument(skip(self), fields(source = %source.display(), destination = %destination.display()))]
    async fn move_entry(
        &self,
        source: &Path,
        destination: &Path,
        overwrite: bool,
    ) -> Result<MoveReceipt, MoverError> {
        if !self.stat(source).await?.exists {
            return Err(MoverError::SourceNotFound(source.to_path_buf()));
        }

        let displaced = if self.stat(destination).await?.exists {
            if !overwrite {
                return Err(MoverError::DestinationOccupied(destination.to_path_buf()));
            }
            let aside = displaced_path(destination);
            debug!(displaced = %aside.display(), "setting destination aside");
            rename(destination, &aside).await?;
            Some(aside)
        } else {
            None
        };

        let created_dirs = match create_parents(destination).await {
            Ok(dirs) => dirs,
            Err(e) => {
                restore_displaced(displaced.as_deref(), destination).await;
                return Err(e);
            }
        };

        if let Err(e) = relocate(source, destination).await {
            remove_created(&created_dirs).await;
            restore_displaced(displaced.as_deref(), destination).await;
            return Err(e);
        }

        debug!(created = created_dirs.len(), "move complete");
        Ok(MoveReceipt {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            displaced,
            created_dirs,
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete(&self, path: &Path, recursive: bool) -> Result<(), MoverError> {
        let state = self.stat(path).await?;
        if !state.exists {
            return Err(MoverError::NotFound(path.to_path_buf()));
        }

        let result = match (state.is_dir, recursive) {
            (true, true) => tokio::fs::remove_dir_all(path).await,
            (true, false) => tokio::fs::remove_dir(path).await,
            (false, _) => tokio::fs::remove_file(path).await,
        };
        result.map_err(|e| MoverError::io(path, e))?;

        debug!(recursive, "delete complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn dir_size(&self, path: &Path) -> Result<u64, MoverError> {
        let owned = path.to_path_buf();
        let size = tokio::task::spawn_blocking(move || tree_size(&owned))
            .await
            .map_err(|e| MoverError::io(path, std::io::Error::new(ErrorKind::Other, e)))?;
        match size {
            Ok(total) => Ok(total),
            Err(e) if is_not_found(&e) => Err(MoverError::NotFound(path.to_path_buf())),
            Err(e) => Err(MoverError::io(path, e)),
        }
    }

    #[instrument(skip(self, receipt), fields(source = %receipt.source.display(), destination = %receipt.destination.display()))]
    async fn revert_move(&self, receipt: &MoveReceipt) -> Result<(), MoverError> {
        if self.stat(&receipt.source).await?.exists {
            return Err(MoverError::DestinationOccupied(receipt.source.clone()));
        }
        relocate(&receipt.destination, &receipt.source).await?;
        if let Some(aside) = &receipt.displaced {
            rename(aside, &receipt.destination).await?;
        }
        remove_created(&receipt.created_dirs).await;

        debug!("move reverted");
        Ok(())
    }

    #[instrument(skip(self, receipt), fields(path = %receipt.path.display()))]
    async fn revert_write(&self, receipt: &WriteReceipt) -> Result<(), MoverError> {
        match tokio::fs::remove_file(&receipt.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(MoverError::io(&receipt.path, e)),
        }
        if let Some(aside) = &receipt.displaced {
            rename(aside, &receipt.path).await?;
        }

        debug!("write reverted");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %displaced.display()))]
    async fn discard_displaced(&self, displaced: &Path) -> Result<(), MoverError> {
        let owned = displaced.to_path_buf();
        let result = tokio::task::spawn_blocking(move || remove_any(&owned))
            .await
            .map_err(|e| MoverError::io(displaced, std::io::Error::new(ErrorKind::Other, e)))?;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MoverError::io(displaced, e)),
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
