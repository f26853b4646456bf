//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including path validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A path resolved outside of the managed root
    #[error("Path escapes managed root: {0}")]
    PathOutsideRoot(String),

    /// Invalid single-segment item name
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("a//..".to_string());
        assert_eq!(err.to_string(), "Invalid path: a//..");

        let err = DomainError::PathOutsideRoot("../etc".to_string());
        assert_eq!(err.to_string(), "Path escapes managed root: ../etc");

        let err = DomainError::InvalidState {
            from: "committed".to_string(),
            to: "rolled_back".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from committed to rolled_back"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidName("a/b".to_string());
        let err2 = DomainError::InvalidName("a/b".to_string());
        let err3 = DomainError::InvalidName("..".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
