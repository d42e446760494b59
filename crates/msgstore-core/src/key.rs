//! Ordered index keys and their byte encoding.
//!
//! A [`Key`] is the unit every object store and index is ordered by. Keys of
//! different types order as `Int < Text < Array`; arrays order element by
//! element with a shorter prefix first. This lets a composite key such as
//! `[value, timestamp]` be range-scanned with a fixed `value`.
//!
//! [`Key::encode`] produces bytes whose memcmp order equals `Key` order:
//! - `Int`: `0x10`, then the big-endian value with the sign bit flipped
//! - `Text`: `0x20`, UTF-8 with `0x00` escaped as `0x00 0xFF`, then `0x00 0x00`
//! - `Array`: `0x30`, each element's encoding, then `0x00`
//!
//! Encodings are self-delimiting, so concatenating them orders like a tuple.
//! No encoding starts with `0xFF`; storage uses that byte as an "after every
//! suffix" marker in range bounds.

use std::fmt;
use std::ops::Bound;

use ciborium::value::Value;

use crate::error::CoreError;

const TAG_INT: u8 = 0x10;
const TAG_TEXT: u8 = 0x20;
const TAG_ARRAY: u8 = 0x30;
const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xFF;
const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Byte that sorts after every encoded key.
pub const KEY_SUFFIX_MAX: u8 = 0xFF;

/// An ordered key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int(i64),
    Text(String),
    Array(Vec<Key>),
}

impl Key {
    /// Build a two-element composite key.
    pub fn pair(first: impl Into<Key>, second: impl Into<Key>) -> Self {
        Key::Array(vec![first.into(), second.into()])
    }

    /// Encode into memcmp-ordered bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Append the encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Key::Int(v) => {
                out.push(TAG_INT);
                out.extend_from_slice(&((*v as u64) ^ SIGN_BIT).to_be_bytes());
            }
            Key::Text(s) => {
                out.push(TAG_TEXT);
                for &b in s.as_bytes() {
                    out.push(b);
                    if b == TERMINATOR {
                        out.push(ESCAPE);
                    }
                }
                out.push(TERMINATOR);
                out.push(TERMINATOR);
            }
            Key::Array(items) => {
                out.push(TAG_ARRAY);
                for item in items {
                    item.encode_into(out);
                }
                out.push(TERMINATOR);
            }
        }
    }

    /// Decode one key that spans all of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let (key, used) = Self::decode_prefix(bytes)?;
        if used != bytes.len() {
            return Err(CoreError::Decoding(format!(
                "{} trailing bytes after key",
                bytes.len() - used
            )));
        }
        Ok(key)
    }

    /// Decode one key from the front of `bytes`, returning it and the number
    /// of bytes consumed.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize), CoreError> {
        let tag = *bytes
            .first()
            .ok_or_else(|| CoreError::Decoding("empty key".into()))?;
        match tag {
            TAG_INT => {
                let raw: [u8; 8] = bytes
                    .get(1..9)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| CoreError::Decoding("truncated integer key".into()))?;
                Ok((Key::Int((u64::from_be_bytes(raw) ^ SIGN_BIT) as i64), 9))
            }
            TAG_TEXT => {
                let mut text = Vec::new();
                let mut pos = 1;
                loop {
                    let b = *bytes
                        .get(pos)
                        .ok_or_else(|| CoreError::Decoding("unterminated text key".into()))?;
                    if b != TERMINATOR {
                        text.push(b);
                        pos += 1;
                        continue;
                    }
                    match bytes.get(pos + 1) {
                        Some(&TERMINATOR) => {
                            pos += 2;
                            break;
                        }
                        Some(&ESCAPE) => {
                            text.push(TERMINATOR);
                            pos += 2;
                        }
                        _ => return Err(CoreError::Decoding("bad text escape".into())),
                    }
                }
                let text = String::from_utf8(text)
                    .map_err(|e| CoreError::Decoding(format!("text key is not utf-8: {}", e)))?;
                Ok((Key::Text(text), pos))
            }
            TAG_ARRAY => {
                let mut items = Vec::new();
                let mut pos = 1;
                loop {
                    match bytes.get(pos) {
                        Some(&TERMINATOR) => {
                            pos += 1;
                            break;
                        }
                        Some(_) => {
                            let (item, used) = Self::decode_prefix(&bytes[pos..])?;
                            items.push(item);
                            pos += used;
                        }
                        None => {
                            return Err(CoreError::Decoding("unterminated array key".into()))
                        }
                    }
                }
                Ok((Key::Array(items), pos))
            }
            other => Err(CoreError::Decoding(format!("unknown key tag 0x{:02x}", other))),
        }
    }

    /// Extract a key from a CBOR value.
    ///
    /// Integers, text, and arrays of those are keys. Anything else (null,
    /// booleans, floats, maps, bytes) is not, and yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => i64::try_from(*i).ok().map(Key::Int),
            Value::Text(s) => Some(Key::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Key]> {
        match self {
            Key::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Hex form of the encoding, for diagnostics.
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{}", v),
            Key::Text(s) => write!(f, "{:?}", s),
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

/// A range over keys, with independently open or closed ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Key>,
    pub upper: Bound<Key>,
}

impl KeyRange {
    /// Every key.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key.
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// `lower <= k <= upper`.
    pub fn bound(lower: Key, upper: Key) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
        }
    }

    /// `k >= lower`.
    pub fn lower_bound(lower: Key) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Unbounded,
        }
    }

    /// `k <= upper`.
    pub fn upper_bound(upper: Key) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Included(upper),
        }
    }

    /// Build from optional inclusive ends; `None` leaves that end open.
    pub fn from_options(lower: Option<Key>, upper: Option<Key>) -> Self {
        Self {
            lower: lower.map_or(Bound::Unbounded, Bound::Included),
            upper: upper.map_or(Bound::Unbounded, Bound::Included),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }
}
