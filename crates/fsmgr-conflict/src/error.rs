//! Error types for conflict naming

use fsmgr_core::domain::DomainError;
use thiserror::Error;

/// Errors that can occur while choosing a free name
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// Every suffix up to the configured cap is taken
    #[error("no free name for {name:?} after {max} attempts")]
    TooManyConflicts { name: String, max: u32 },

    /// The base name is not a valid single path segment
    #[error(transparent)]
    InvalidName(#[from] DomainError),
}
