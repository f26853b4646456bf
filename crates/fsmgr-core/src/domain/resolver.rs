//! Mapping between user input, canonical keys and real paths
//!
//! The managed root holds live items; the recycle root holds soft-deleted
//! ones, each top-level entry named after the base name of what was deleted.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use super::errors::DomainError;
use super::newtypes::CanonicalPath;

/// Both forms of a resolved user path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Location on disk
    pub absolute: PathBuf,
    /// Metadata key
    pub canonical: CanonicalPath,
}

/// Translates user-supplied paths for one managed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    recycle_root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, recycle_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recycle_root: recycle_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recycle_root(&self) -> &Path {
        &self.recycle_root
    }

    /// Resolve a relative user path.
    ///
    /// A leading separator is ignored, `\` is accepted as a separator.
    ///
    /// # Errors
    /// Returns `DomainError::PathOutsideRoot` for traversal attempts
    pub fn resolve(&self, user_path: &str) -> Result<ResolvedPath, DomainError> {
        let canonical = CanonicalPath::parse(user_path)?;
        let absolute = self.absolute(&canonical);
        if !absolute.starts_with(&self.root) {
            return Err(DomainError::PathOutsideRoot(user_path.to_string()));
        }
        Ok(ResolvedPath { absolute, canonical })
    }

    /// Decode form-encoded input (`%xx` escapes, `+` as space) and resolve it.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` when the decoded bytes are not
    /// UTF-8, otherwise the errors of [`PathResolver::resolve`]
    pub fn resolve_encoded(&self, raw: &str) -> Result<ResolvedPath, DomainError> {
        let decoded = decode_user_path(raw)?;
        self.resolve(&decoded)
    }

    /// Absolute location of a canonical path under the managed root
    pub fn absolute(&self, canonical: &CanonicalPath) -> PathBuf {
        let mut path = self.root.clone();
        for segment in canonical.segments() {
            path.push(segment);
        }
        path
    }

    /// Canonical key of an absolute path under the managed root
    ///
    /// # Errors
    /// Returns `DomainError::PathOutsideRoot` if `absolute` is elsewhere
    pub fn canonical_of(&self, absolute: &Path) -> Result<CanonicalPath, DomainError> {
        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| DomainError::PathOutsideRoot(absolute.display().to_string()))?;
        CanonicalPath::parse(&relative.to_string_lossy())
    }

    /// Top-level recycle entry for an item named `name`
    pub fn recycle_path(&self, name: &str) -> PathBuf {
        self.recycle_root.join(name)
    }

    /// Path of a recycle entry relative to the recycle root, used as a lock key
    ///
    /// # Errors
    /// Returns `DomainError::PathOutsideRoot` if `absolute` is not inside
    /// the recycle area
    pub fn recycle_key(&self, absolute: &Path) -> Result<CanonicalPath, DomainError> {
        let relative = absolute
            .strip_prefix(&self.recycle_root)
            .map_err(|_| DomainError::PathOutsideRoot(absolute.display().to_string()))?;
        CanonicalPath::parse(&relative.to_string_lossy())
    }
}

/// Form-style decoding used for paths arriving from request parameters.
///
/// # Errors
/// Returns `DomainError::InvalidPath` if the result is not valid UTF-8
pub fn decode_user_path(raw: &str) -> Result<String, DomainError> {
    let plus_decoded: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| DomainError::InvalidPath(format!("{raw}: {e}")))
}
