//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Store-assigned integer IDs
// ============================================================================

/// Identifier of a metadata record.
///
/// Assigned by the metadata store on insert and never reused, so it stays
/// stable across rename, soft delete and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    /// Create an ItemId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid ItemId: {e}")))
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier for audit log entries (auto-incrementing integer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(i64);

impl AuditId {
    /// Create an AuditId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for AuditId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AuditId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier of one logical engine operation (one Phase F / Phase M pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new random OperationId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an OperationId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid OperationId: {e}")))
    }
}

impl From<Uuid> for OperationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Names and canonical paths
// ============================================================================

/// Check that `name` is usable as a single path segment.
///
/// # Errors
/// Returns `DomainError::InvalidName` for empty names, `.`/`..`, names
/// containing a separator or a NUL byte.
pub fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() || name.trim().is_empty() {
        return Err(DomainError::InvalidName("name is empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(DomainError::InvalidName(name.to_string()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(DomainError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Forward-slash path of an item relative to the managed root.
///
/// This is the metadata key of every record. A canonical path:
/// - Uses `/` as the only separator
/// - Has no leading or trailing separator and no empty segments
/// - Contains no `.` or `..` segments
///
/// The managed root itself is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The managed root (empty path)
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Normalize arbitrary user or stored input into a canonical path.
    ///
    /// Both `\` and `/` are treated as separators, empty and `.` segments
    /// are dropped and `..` removes the previous segment.
    ///
    /// # Errors
    /// Returns `DomainError::PathOutsideRoot` when `..` would climb above
    /// the root, and `DomainError::InvalidPath` for NUL bytes.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.contains('\0') {
            return Err(DomainError::InvalidPath(raw.replace('\0', "\\0")));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(DomainError::PathOutsideRoot(raw.to_string()));
                    }
                }
                other => segments.push(other),
            }
        }

        Ok(Self(segments.join("/")))
    }

    /// The normalized string form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the managed root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, or the empty string for the root
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Parent path, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// All proper ancestors below the root, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            if path.is_root() {
                break;
            }
            current = path.parent();
            out.push(path);
        }
        out
    }

    /// Append a single validated segment
    ///
    /// # Errors
    /// Returns `DomainError::InvalidName` if `name` is not a single segment
    pub fn join(&self, name: &str) -> Result<Self, DomainError> {
        validate_name(name)?;
        if self.is_root() {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Sibling path with the last segment replaced by `name`
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` for the root and
    /// `DomainError::InvalidName` for a malformed name
    pub fn with_name(&self, name: &str) -> Result<Self, DomainError> {
        let parent = self
            .parent()
            .ok_or_else(|| DomainError::InvalidPath("the root has no name".to_string()))?;
        parent.join(name)
    }

    /// True when `other` equals this path or lies underneath it
    #[must_use]
    pub fn is_ancestor_or_self(&self, other: &Self) -> bool {
        self.relative(other).is_some()
    }

    /// True when one of the two paths contains the other
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_ancestor_or_self(other) || other.is_ancestor_or_self(self)
    }

    /// Remainder of `descendant` below this path.
    ///
    /// Returns `Some("")` for the path itself and `None` when `descendant`
    /// is not at or under this path.
    #[must_use]
    pub fn relative<'a>(&self, descendant: &'a Self) -> Option<&'a str> {
        if self.is_root() {
            return Some(descendant.as_str());
        }
        let rest = descendant.0.strip_prefix(self.0.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }

    /// Move this path from under `from` to under `to`.
    ///
    /// Returns `None` if this path is not `from` or one of its descendants.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        let rest = from.relative(self)?;
        Some(match (to.is_root(), rest.is_empty()) {
            (_, true) => to.clone(),
            (true, false) => Self(rest.to_string()),
            (false, false) => Self(format!("{}/{}", to.0, rest)),
        })
    }
}

impl Display for CanonicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl FromStr for CanonicalPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CanonicalPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanonicalPath> for String {
    fn from(path: CanonicalPath) -> Self {
        path.0
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
