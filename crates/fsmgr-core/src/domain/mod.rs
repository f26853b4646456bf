//! Domain entities and business logic
//!
//! This module contains the core domain types for fsmgr:
//! - Newtypes for identifiers and the canonical path key
//! - Item metadata records and insert payloads
//! - Path resolution against the managed root and recycle area
//! - Audit entries for tracking operations
//! - Per-operation phase tracking for the two-phase protocol
//! - Domain-specific error types

pub mod audit;
pub mod errors;
pub mod item;
pub mod newtypes;
pub mod operation;
pub mod resolver;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, AuditResult};
pub use errors::DomainError;
pub use item::{format_size, Actor, Item, ItemParts, NewItem};
pub use newtypes::*;
pub use operation::{OperationKind, OperationPhase};
pub use resolver::{decode_user_path, PathResolver, ResolvedPath};
