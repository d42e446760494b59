//! Backend traits: the byte-level ordered key-value interface.
//!
//! Backends only know about byte strings ordered by memcmp. Object stores,
//! indexes and key encoding are layered on top in [`crate::transaction`].
//! Implementations include SQLite (persistent) and in-memory (for tests).

use std::ops::Bound;

use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Descending key order.
    Prev,
}

impl Direction {
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Direction::Prev
        } else {
            Direction::Next
        }
    }

    pub fn is_reverse(self) -> bool {
        self == Direction::Prev
    }
}

/// A range of raw byte keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
}

impl ByteRange {
    pub fn new(start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        Self { start, end }
    }

    /// Every key that starts with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            start: Bound::Included(prefix.to_vec()),
            end: next_prefix(prefix).map_or(Bound::Unbounded, Bound::Excluded),
        }
    }

    /// Whether the range can contain no key at all.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.start {
            Bound::Included(s) => key >= s.as_slice(),
            Bound::Excluded(s) => key > s.as_slice(),
            Bound::Unbounded => true,
        };
        let below = match &self.end {
            Bound::Included(e) => key <= e.as_slice(),
            Bound::Excluded(e) => key < e.as_slice(),
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// The smallest byte string greater than every string starting with
/// `prefix`, or `None` if no such string exists (all bytes are `0xFF`).
pub fn next_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < u8::MAX {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

/// Read access to a backend, valid for the duration of one transaction.
pub trait KvRead {
    /// Get the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Return up to `limit` entries inside `range`, in `direction` order.
    fn scan(
        &self,
        range: &ByteRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>>;
}

/// Write access to a backend, valid for the duration of one transaction.
pub trait KvWrite: KvRead {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Returns whether it was present.
    fn delete(&mut self, key: &[u8]) -> Result<bool>;

    /// View this writer as a reader.
    fn as_read(&self) -> &dyn KvRead;
}

/// An ordered key-value backend with atomic write transactions.
///
/// # Design Notes
///
/// - **Atomic writes**: if the closure passed to [`KvBackend::write`]
///   returns `Err`, none of its writes are visible afterwards.
/// - **Isolation**: a write is not visible to concurrent readers until it
///   commits. Writers are serialized.
/// - **Blocking**: both methods block; async callers run them on a blocking
///   thread.
pub trait KvBackend: Send + Sync + 'static {
    /// Run `f` with a consistent read view.
    fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn KvRead) -> std::result::Result<T, E>,
        E: From<StoreError>;

    /// Run `f` in a write transaction that commits only if `f` succeeds.
    fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn KvWrite) -> std::result::Result<T, E>,
        E: From<StoreError>;
}
