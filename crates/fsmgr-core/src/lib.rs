//! fsmgr Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Item`, `NewItem`, `AuditEntry`, `OperationPhase`
//! - **Path handling** - `CanonicalPath` and the `PathResolver` that maps user
//!   input onto the managed root and the recycle area
//! - **Port definitions** - Traits for adapters: `IMetadataStore`, `IFileSystemMover`
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! The domain module is pure: no I/O, no async. Ports define the trait
//! interfaces that the cache (SQLite) and sync (filesystem + engine) crates
//! implement or consume.

pub mod config;
pub mod domain;
pub mod ports;
