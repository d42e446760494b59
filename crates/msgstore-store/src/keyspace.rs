//! Layout of object stores and indexes in the flat byte keyspace.
//!
//! ```text
//! 0x01 ‖ name                                     metadata
//! 0x02 ‖ enc(store) ‖ enc(pk)                     record (CBOR)
//! 0x03 ‖ enc(store) ‖ enc(index) ‖ enc(ik) ‖ enc(pk)  index entry (empty)
//! ```
//!
//! Encoded keys never start with `0xFF`, so `prefix ‖ enc(k) ‖ 0xFF` sorts
//! after every index entry whose index key is `k`.

use std::ops::Bound;

use msgstore_core::key::KEY_SUFFIX_MAX;
use msgstore_core::{Key, KeyRange};

use crate::error::{Result, StoreError};
use crate::traits::{next_prefix, ByteRange};

const META: u8 = 0x01;
const RECORD: u8 = 0x02;
const INDEX: u8 = 0x03;

pub(crate) const META_VERSION: &str = "version";
pub(crate) const META_CATALOG: &str = "catalog";

pub(crate) fn meta_key(name: &str) -> Vec<u8> {
    let mut out = vec![META];
    out.extend_from_slice(name.as_bytes());
    out
}

pub(crate) fn store_prefix(store: &str) -> Vec<u8> {
    let mut out = vec![RECORD];
    Key::from(store).encode_into(&mut out);
    out
}

pub(crate) fn record_key(store: &str, pk: &Key) -> Vec<u8> {
    let mut out = store_prefix(store);
    pk.encode_into(&mut out);
    out
}

pub(crate) fn index_prefix(store: &str, index: &str) -> Vec<u8> {
    let mut out = vec![INDEX];
    Key::from(store).encode_into(&mut out);
    Key::from(index).encode_into(&mut out);
    out
}

pub(crate) fn index_entry_key(store: &str, index: &str, key: &Key, pk: &Key) -> Vec<u8> {
    let mut out = index_prefix(store, index);
    key.encode_into(&mut out);
    pk.encode_into(&mut out);
    out
}

/// Decode the primary key of a record key under `prefix`.
pub(crate) fn decode_record_key(prefix: &[u8], raw: &[u8]) -> Result<Key> {
    let rest = raw
        .strip_prefix(prefix)
        .ok_or_else(|| StoreError::InvalidData(format!("foreign record key {}", hex::encode(raw))))?;
    Ok(Key::decode(rest)?)
}

/// Decode `(index_key, primary_key)` of an index entry under `prefix`.
pub(crate) fn decode_index_entry(prefix: &[u8], raw: &[u8]) -> Result<(Key, Key)> {
    let rest = raw
        .strip_prefix(prefix)
        .ok_or_else(|| StoreError::InvalidData(format!("foreign index key {}", hex::encode(raw))))?;
    let (key, used) = Key::decode_prefix(rest)?;
    let pk = Key::decode(&rest[used..])?;
    Ok((key, pk))
}

fn with_key(prefix: &[u8], key: &Key) -> Vec<u8> {
    let mut out = prefix.to_vec();
    key.encode_into(&mut out);
    out
}

fn with_key_max(prefix: &[u8], key: &Key) -> Vec<u8> {
    let mut out = with_key(prefix, key);
    out.push(KEY_SUFFIX_MAX);
    out
}

fn prefix_end(prefix: &[u8]) -> Bound<Vec<u8>> {
    next_prefix(prefix).map_or(Bound::Unbounded, Bound::Excluded)
}

/// Byte range of the records of a store whose primary key is in `range`.
pub(crate) fn record_range(prefix: &[u8], range: &KeyRange) -> ByteRange {
    let start = match &range.lower {
        Bound::Included(k) => Bound::Included(with_key(prefix, k)),
        Bound::Excluded(k) => Bound::Excluded(with_key(prefix, k)),
        Bound::Unbounded => Bound::Included(prefix.to_vec()),
    };
    let end = match &range.upper {
        Bound::Included(k) => Bound::Included(with_key(prefix, k)),
        Bound::Excluded(k) => Bound::Excluded(with_key(prefix, k)),
        Bound::Unbounded => prefix_end(prefix),
    };
    ByteRange::new(start, end)
}

/// Byte range of the entries of an index whose index key is in `range`.
///
/// Entries carry the primary key as a suffix, so an inclusive upper bound
/// and an exclusive lower bound both have to skip past every suffix.
pub(crate) fn index_range(prefix: &[u8], range: &KeyRange) -> ByteRange {
    let start = match &range.lower {
        Bound::Included(k) => Bound::Included(with_key(prefix, k)),
        Bound::Excluded(k) => Bound::Excluded(with_key_max(prefix, k)),
        Bound::Unbounded => Bound::Included(prefix.to_vec()),
    };
    let end = match &range.upper {
        Bound::Included(k) => Bound::Excluded(with_key_max(prefix, k)),
        Bound::Excluded(k) => Bound::Excluded(with_key(prefix, k)),
        Bound::Unbounded => prefix_end(prefix),
    };
    ByteRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn key() -> impl Strategy<Value = Key> {
        prop_oneof![
            any::<i64>().prop_map(Key::Int),
            "[a-c+1]{0,3}".prop_map(Key::from),
            (-3i64..3, -3i64..3).prop_map(|(a, b)| Key::pair(a, b)),
            ("[+1]{0,2}", any::<i64>()).prop_map(|(n, ts)| Key::pair(n, ts)),
        ]
    }

    fn bound() -> impl Strategy<Value = Bound<Key>> {
        prop_oneof![
            Just(Bound::Unbounded),
            key().prop_map(Bound::Included),
            key().prop_map(Bound::Excluded),
        ]
    }

    proptest! {
        #[test]
        fn test_encoding_sorts_like_keys(a in key(), b in key()) {
            prop_assert_eq!(a.encode().cmp(&b.encode()), a.cmp(&b));
        }

        #[test]
        fn test_index_range_admits_exactly_the_key_range(
            lower in bound(),
            upper in bound(),
            key in key(),
            pk in any::<i64>(),
        ) {
            let range = KeyRange { lower, upper };
            let bytes = index_range(&index_prefix("sms", "number"), &range);
            let entry = index_entry_key("sms", "number", &key, &Key::Int(pk));
            prop_assert_eq!(bytes.contains(&entry), range.contains(&key));
        }
    }

    #[test]
    fn test_index_entry_roundtrip() {
        let prefix = index_prefix("sms", "number");
        let raw = index_entry_key("sms", "number", &Key::pair("+1", 5), &Key::Int(9));
        let (key, pk) = decode_index_entry(&prefix, &raw).unwrap();
        assert_eq!(key, Key::pair("+1", 5));
        assert_eq!(pk, Key::Int(9));
    }

    #[test]
    fn test_index_range_bounds() {
        let prefix = index_prefix("sms", "read");
        let entry = |k: Key, pk: i64| index_entry_key("sms", "read", &k, &Key::Int(pk));

        let range = index_range(&prefix, &KeyRange::bound(Key::pair(0, 10), Key::pair(0, 20)));
        assert!(range.contains(&entry(Key::pair(0, 10), 1)));
        assert!(range.contains(&entry(Key::pair(0, 20), i64::MAX)));
        assert!(!range.contains(&entry(Key::pair(0, 21), 1)));
        assert!(!range.contains(&entry(Key::pair(1, 15), 1)));

        let exclusive = KeyRange {
            lower: Bound::Excluded(Key::pair(0, 10)),
            upper: Bound::Excluded(Key::pair(0, 20)),
        };
        let range = index_range(&prefix, &exclusive);
        assert!(!range.contains(&entry(Key::pair(0, 10), 99)));
        assert!(range.contains(&entry(Key::pair(0, 11), 0)));
        assert!(!range.contains(&entry(Key::pair(0, 20), 0)));
    }

    #[test]
    fn test_unbounded_index_range_stays_in_index() {
        let prefix = index_prefix("sms", "read");
        let range = index_range(&prefix, &KeyRange::all());
        assert!(range.contains(&index_entry_key("sms", "read", &Key::Int(0), &Key::Int(1))));
        assert!(!range.contains(&index_entry_key("sms", "reads", &Key::Int(0), &Key::Int(1))));
        assert!(!range.contains(&index_entry_key("smt", "read", &Key::Int(0), &Key::Int(1))));
    }

    #[test]
    fn test_record_range() {
        let prefix = store_prefix("sms");
        let range = record_range(&prefix, &KeyRange::lower_bound(Key::Int(3)));
        assert!(range.contains(&record_key("sms", &Key::Int(3))));
        assert!(!range.contains(&record_key("sms", &Key::Int(2))));
        assert!(!range.contains(&record_key("most-recent", &Key::from("x"))));
    }
}
