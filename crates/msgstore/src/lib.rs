//! # msgstore
//!
//! A persistent SMS message database with per-conversation rollups and
//! filtered, pull-based message lists.
//!
//! ## Overview
//!
//! - **Messages**: saved from incoming or outgoing input, normalized, and
//!   indexed by timestamp, delivery, participant number, and read state
//! - **Threads**: one rollup per counterpart number holding the newest
//!   message and the unread count, kept consistent in the same transaction
//!   as every save, delete, and read change
//! - **Lists**: a query over any combination of date range, delivery,
//!   numbers, and read state, streamed in timestamp order and pulled one
//!   message at a time
//! - **Migrations**: every older on-disk layout is upgraded step by step to
//!   the current schema on open
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use msgstore::core::{MessageFilter, RawMessage, StaticPhoneContext};
//! use msgstore::{ListCreation, MessageDatabase};
//!
//! async fn example() -> msgstore::Result<()> {
//!     let phone = Arc::new(StaticPhoneContext::new(Some("+15550000")));
//!     let db = MessageDatabase::in_memory(phone);
//!
//!     let id = db.save_received(RawMessage::received("+1555", "hi", 100)).await?;
//!     db.mark_read(id, true).await?;
//!
//!     let filter = MessageFilter::new().numbers(["+1555"]);
//!     if let ListCreation::Created { list_id, first } =
//!         db.create_message_list(filter, false).await?
//!     {
//!         println!("{}", first.body);
//!         while let Some(message) = db.get_next_message_in_list(list_id).await? {
//!             println!("{}", message.body);
//!         }
//!         db.clear_message_list(list_id)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! Storage access runs on the blocking pool. Each index stream of a query
//! is scanned by its own task in short read transactions; the streams are
//! merged by timestamp frontier, so a list sees committed data only and
//! holds no transaction open between pages.
//!
//! ## Re-exports
//!
//! - `msgstore::core` - Keys, records, filters, and the record codec
//! - `msgstore::store` - The key-value substrate and its backends

pub mod config;
pub mod error;
mod gateway;
mod list;
pub mod migration;
mod query;
mod rollup;
pub mod schema;
pub mod service;

pub use msgstore_core as core;
pub use msgstore_store as store;

pub use config::DatabaseConfig;
pub use error::{DbError, ErrorCode, Result};
pub use service::{DatabaseStats, ListCreation, MessageDatabase};

pub use msgstore_core::{
    Delivery, DeliveryStatus, ListId, Message, MessageFilter, MessageId, RawMessage, ThreadRecord,
};
pub use msgstore_store::{MemoryBackend, SqliteBackend};
