//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the engine depends on; implementations live in
//! adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IMetadataStore`] - Item records and audit trail (SQLite in `fsmgr-cache`)
//! - [`IFileSystemMover`] - Reversible filesystem mutation (`fsmgr-sync`)

pub mod filesystem_mover;
pub mod metadata_store;

pub use filesystem_mover::{EntryState, IFileSystemMover, MoveReceipt, MoverError, WriteReceipt};
pub use metadata_store::{CommitOutcome, IMetadataStore, Mutation};
