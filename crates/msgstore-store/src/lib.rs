//! # msgstore Store
//!
//! The ordered key-value substrate for msgstore. Provides object stores with
//! named secondary indexes on top of a byte-level backend, with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! A backend ([`KvBackend`]) only stores memcmp-ordered byte keys. The
//! [`Database`] layers a catalog of object stores and indexes over it, opens
//! at a schema version with an upgrade hook, and runs closures inside scoped
//! [`Transaction`]s.
//!
//! ## Key Types
//!
//! - [`KvBackend`] - The byte-level backend trait
//! - [`SqliteBackend`] - SQLite-based persistent backend
//! - [`MemoryBackend`] - In-memory backend for tests
//! - [`Database`] - Versioned open, scoped read and write transactions
//! - [`Transaction`] - Record and index access inside one transaction
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use msgstore_store::{Database, Direction, MemoryBackend};
//! use msgstore_core::KeyRange;
//!
//! let db = Database::open(Arc::new(MemoryBackend::new()), 1, |txn, _old, _new| {
//!     txn.create_store("notes", "id")?;
//!     txn.create_index("notes", "timestamp", "timestamp", false)
//! })
//! .unwrap();
//!
//! let newest = db
//!     .read(&["notes"], |txn| {
//!         txn.scan_index("notes", "timestamp", &KeyRange::all(), Direction::Prev, None, Some(1))
//!     })
//!     .unwrap();
//! assert!(newest.is_empty());
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic writes**: a write closure that returns `Err` leaves no trace
//! - **Index maintenance**: every `put` and `delete` rewrites index entries
//!   in the same transaction
//! - **Invalid keys**: records whose indexed field is not a valid key get no
//!   entry in that index

pub mod catalog;
pub mod database;
pub mod error;
mod keyspace;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;
pub mod transaction;

pub use catalog::{Catalog, IndexSchema, StoreSchema};
pub use database::Database;
pub use error::{Result, StoreError};
pub use memory::{MemoryBackend, ScanHold};
pub use sqlite::SqliteBackend;
pub use traits::{ByteRange, Direction, KvBackend, KvRead, KvWrite};
pub use transaction::{IndexEntry, Transaction};
