//! Error types for the message database.

use msgstore_core::{ListId, MessageId, ValidationError};
use msgstore_store::StoreError;
use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The raw message failed validation. Nothing was written.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// No message with this id.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// No open list with this id.
    #[error("message list not found: {0}")]
    ListNotFound(ListId),

    /// A stored record carries a different id than the key it is stored
    /// under.
    #[error("record under key {expected} carries id {found}")]
    Inconsistent { expected: MessageId, found: MessageId },

    /// A `get_next` request is already waiting on this list.
    #[error("a request is already pending on list {0}")]
    RequestPending(ListId),

    /// The list was cleared while a request was waiting on it.
    #[error("message list {0} was cleared")]
    Cancelled(ListId),

    /// A cursor behind a message list failed. The list stays failed.
    #[error("message list query failed: {0}")]
    QueryFailed(String),

    /// Internal error (task failure, poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classification reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    NotFound,
    UnknownError,
    InvalidInput,
}

impl DbError {
    /// The caller-facing classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::Validation(_) => ErrorCode::InvalidInput,
            DbError::MessageNotFound(_) | DbError::ListNotFound(_) => ErrorCode::NotFound,
            DbError::Inconsistent { .. } => ErrorCode::UnknownError,
            DbError::Store(_)
            | DbError::RequestPending(_)
            | DbError::Cancelled(_)
            | DbError::QueryFailed(_)
            | DbError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let invalid = DbError::from(ValidationError::MissingField("sender"));
        assert_eq!(invalid.code(), ErrorCode::InvalidInput);
        assert_eq!(DbError::MessageNotFound(MessageId::new(3)).code(), ErrorCode::NotFound);
        assert_eq!(DbError::ListNotFound(ListId(1)).code(), ErrorCode::NotFound);
        assert_eq!(
            DbError::Inconsistent {
                expected: MessageId::new(1),
                found: MessageId::new(2)
            }
            .code(),
            ErrorCode::UnknownError
        );
        assert_eq!(DbError::from(StoreError::ReadOnly).code(), ErrorCode::InternalError);
    }
}
