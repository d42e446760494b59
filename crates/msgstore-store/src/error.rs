//! Error types for the store module.

use msgstore_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Key encoding error.
    #[error(transparent)]
    Key(#[from] CoreError),

    /// The object store is not in the catalog.
    #[error("unknown object store `{0}`")]
    UnknownStore(String),

    /// The index is not defined on the store.
    #[error("unknown index `{index}` on store `{store}`")]
    UnknownIndex { store: String, index: String },

    /// The store was not named when the transaction was opened.
    #[error("object store `{0}` is not in the transaction scope")]
    NotInScope(String),

    /// A write was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// A schema change was attempted outside an upgrade.
    #[error("`{0}` is only allowed during an upgrade")]
    UpgradeOnly(&'static str),

    /// A uniqueness constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The stored schema version is newer than the requested one.
    #[error("stored schema version {stored} is newer than supported version {supported}")]
    VersionTooNew { stored: u32, supported: u32 },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// Injected failure from a test backend.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// Injected scan failure from a test backend.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
