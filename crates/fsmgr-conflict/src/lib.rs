//! fsmgr Conflict - Collision-free naming
//!
//! Provides:
//! - `(n)` suffixing for occupied file and directory names
//! - Extension preservation for renames
//! - A configurable cap on how far the suffix search goes

pub mod error;
pub mod namer;

pub use error::NamingError;
pub use namer::{force_extension, split_extension, NameConflictResolver, NameKind};
