//! fsmgr Audit - Durable operation trail
//!
//! Provides:
//! - `AuditLogger`: records committed, rolled-back and diverged operations
//! - `OperationRecord`: the facts about one operation that get recorded
//! - Persistence through the `IMetadataStore` port

pub mod logger;

pub use logger::{AuditLogger, OperationRecord, CODE_ROLLBACK_FAILED, CODE_ROLLED_BACK};
