//! Names of the object stores and indexes, and the current schema version.

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 7;

/// Message store, keyed by `id`.
pub const STORE_MESSAGES: &str = "sms";
/// Thread rollup store, keyed by `senderOrReceiver`.
pub const STORE_THREADS: &str = "most-recent";

/// Timestamp index, on both stores.
pub const INDEX_TIMESTAMP: &str = "timestamp";
/// `(delivery, timestamp)` on the message store.
pub const INDEX_DELIVERY: &str = "delivery";
/// Multi-entry `(number, timestamp)` on the message store.
pub const INDEX_NUMBER: &str = "number";
/// `(read, timestamp)` on the message store.
pub const INDEX_READ: &str = "read";

pub(crate) const MESSAGES: &[&str] = &[STORE_MESSAGES];
pub(crate) const THREADS: &[&str] = &[STORE_THREADS];
pub(crate) const MESSAGES_AND_THREADS: &[&str] = &[STORE_MESSAGES, STORE_THREADS];
