//! Strong type definitions for msgstore.
//!
//! Identifiers are newtypes to prevent mixing message ids with list ids.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::key::Key;

/// The primary key of a stored message.
///
/// Assigned from a monotonic counter; never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Placeholder carried by a prepared record until the database assigns
    /// its real id.
    pub const UNASSIGNED: Self = Self(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    /// The store key for this id.
    pub fn to_key(&self) -> Key {
        Key::Int(self.0 as i64)
    }

    /// Parse a store key back into an id.
    pub fn from_key(key: &Key) -> Option<Self> {
        key.as_int()
            .and_then(|v| u64::try_from(v).ok())
            .map(Self)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of an open message list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(pub u64);

impl fmt::Debug for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListId({})", self.0)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_key_roundtrip() {
        let id = MessageId::new(42);
        assert_eq!(MessageId::from_key(&id.to_key()), Some(id));
        assert_eq!(MessageId::from_key(&Key::Int(-1)), None);
        assert_eq!(MessageId::from_key(&Key::from("42")), None);
    }

    #[test]
    fn test_unassigned() {
        assert!(!MessageId::UNASSIGNED.is_assigned());
        assert!(MessageId::new(1).is_assigned());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", MessageId::new(7)), "7");
        assert_eq!(format!("{:?}", ListId(3)), "ListId(3)");
    }
}
