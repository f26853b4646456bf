//! Item metadata records
//!
//! An [`Item`] is the persisted metadata of one file or directory under the
//! managed root. Its lifecycle:
//!
//! ```text
//!   upload / mkdir          rename / move
//!  ───────────────► Live ◄──────────────┐
//!                   │  ▲                 │
//!       soft delete │  │ restore         │
//!                   ▼  │                 │
//!                 Deleted ───────────────┘ (not allowed while deleted)
//!                   │
//!                   │ permanent delete
//!                   ▼
//!               (record gone)
//! ```
//!
//! A record is deleted exactly when it carries a `deleted_path`; the two
//! fields cannot drift apart because `is_deleted()` is derived.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{CanonicalPath, ItemId};

/// Identity of the caller performing an operation.
///
/// Supplied by the embedding application (or the CLI); recorded as owner,
/// modifier and default issuer on records it touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// Create an actor from a display name
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` for blank names
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "actor name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// The actor's name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plain field bag used to rebuild an [`Item`] from storage.
#[derive(Debug, Clone)]
pub struct ItemParts {
    pub id: ItemId,
    pub canonical_path: CanonicalPath,
    pub size: u64,
    pub date_modified: DateTime<Utc>,
    pub owner: String,
    pub modified_by: String,
    pub issued_by: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_folder: bool,
    pub deleted_path: Option<PathBuf>,
}

/// A persisted metadata record for a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    canonical_path: CanonicalPath,
    size: u64,
    date_modified: DateTime<Utc>,
    owner: String,
    modified_by: String,
    issued_by: String,
    expiry_date: Option<DateTime<Utc>>,
    is_folder: bool,
    deleted_path: Option<PathBuf>,
}

impl Item {
    /// Rebuild an item from its stored fields.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` for a record at the root, which
    /// can never be stored.
    pub fn from_parts(parts: ItemParts) -> Result<Self, DomainError> {
        if parts.canonical_path.is_root() {
            return Err(DomainError::InvalidPath(
                "the managed root has no record".to_string(),
            ));
        }
        Ok(Self {
            id: parts.id,
            name: parts.canonical_path.name().to_string(),
            canonical_path: parts.canonical_path,
            size: parts.size,
            date_modified: parts.date_modified,
            owner: parts.owner,
            modified_by: parts.modified_by,
            issued_by: parts.issued_by,
            expiry_date: parts.expiry_date,
            is_folder: parts.is_folder,
            deleted_path: parts.deleted_path,
        })
    }

    // --- accessors ---

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical_path(&self) -> &CanonicalPath {
        &self.canonical_path
    }

    /// Bytes; for folders the sum of contained files
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn date_modified(&self) -> DateTime<Utc> {
        self.date_modified
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn modified_by(&self) -> &str {
        &self.modified_by
    }

    pub fn issued_by(&self) -> &str {
        &self.issued_by
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_path.is_some()
    }

    /// Location inside the recycle area while deleted
    pub fn deleted_path(&self) -> Option<&Path> {
        self.deleted_path.as_deref()
    }

    // --- transitions ---

    /// Point the record at a new canonical path (rename or move).
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` for deleted records and
    /// `DomainError::InvalidPath` for the root.
    pub fn relocate(&mut self, path: CanonicalPath, actor: &Actor) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::InvalidState {
                from: "deleted".to_string(),
                to: "relocated".to_string(),
            });
        }
        if path.is_root() {
            return Err(DomainError::InvalidPath(
                "cannot relocate onto the managed root".to_string(),
            ));
        }
        self.name = path.name().to_string();
        self.canonical_path = path;
        self.touch(actor);
        Ok(())
    }

    /// Flip the record into the recycle area.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if already deleted
    pub fn mark_deleted(&mut self, deleted_path: PathBuf, actor: &Actor) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::InvalidState {
                from: "deleted".to_string(),
                to: "deleted".to_string(),
            });
        }
        self.deleted_path = Some(deleted_path);
        self.touch(actor);
        Ok(())
    }

    /// Bring the record back to its canonical path.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the record is live
    pub fn mark_restored(&mut self, actor: &Actor) -> Result<(), DomainError> {
        if !self.is_deleted() {
            return Err(DomainError::InvalidState {
                from: "live".to_string(),
                to: "live".to_string(),
            });
        }
        self.deleted_path = None;
        self.touch(actor);
        Ok(())
    }

    /// Record new file content written over this item.
    pub fn record_content(
        &mut self,
        size: u64,
        actor: &Actor,
        issued_by: Option<String>,
        expiry_date: Option<DateTime<Utc>>,
    ) {
        self.size = size;
        if let Some(issued_by) = issued_by {
            self.issued_by = issued_by;
        }
        self.expiry_date = expiry_date;
        self.touch(actor);
    }

    fn touch(&mut self, actor: &Actor) {
        self.date_modified = Utc::now();
        self.modified_by = actor.name().to_string();
    }
}

/// Insert payload for a record that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub canonical_path: CanonicalPath,
    pub size: u64,
    pub date_modified: DateTime<Utc>,
    pub owner: String,
    pub modified_by: String,
    pub issued_by: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_folder: bool,
}

impl NewItem {
    /// A file record created by `actor`
    pub fn file(canonical_path: CanonicalPath, size: u64, actor: &Actor) -> Self {
        Self {
            canonical_path,
            size,
            date_modified: Utc::now(),
            owner: actor.name().to_string(),
            modified_by: actor.name().to_string(),
            issued_by: actor.name().to_string(),
            expiry_date: None,
            is_folder: false,
        }
    }

    /// An empty folder record created by `actor`
    pub fn folder(canonical_path: CanonicalPath, actor: &Actor) -> Self {
        Self {
            is_folder: true,
            ..Self::file(canonical_path, 0, actor)
        }
    }

    /// Override the issuer (defaults to the creating actor)
    pub fn with_issued_by(mut self, issued_by: Option<String>) -> Self {
        if let Some(issued_by) = issued_by {
            self.issued_by = issued_by;
        }
        self
    }

    pub fn with_expiry(mut self, expiry_date: Option<DateTime<Utc>>) -> Self {
        self.expiry_date = expiry_date;
        self
    }

    /// Display name derived from the path
    pub fn name(&self) -> &str {
        self.canonical_path.name()
    }

    /// Materialize the record once the store has assigned an id.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` for a root path
    pub fn into_item(self, id: ItemId) -> Result<Item, DomainError> {
        Item::from_parts(ItemParts {
            id,
            canonical_path: self.canonical_path,
            size: self.size,
            date_modified: self.date_modified,
            owner: self.owner,
            modified_by: self.modified_by,
            issued_by: self.issued_by,
            expiry_date: self.expiry_date,
            is_folder: self.is_folder,
            deleted_path: None,
        })
    }
}

/// Human-readable size with 1024-based units and two decimals.
///
/// ```
/// use fsmgr_core::domain::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
