//! The catalog: object stores and their indexes.
//!
//! Persisted as CBOR in the metadata region. It only changes during an
//! upgrade transaction.

use std::collections::BTreeMap;

use ciborium::value::Value;
use msgstore_core::Key;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// All object stores of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub stores: BTreeMap<String, StoreSchema>,
}

/// One object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    /// Record field holding the primary key.
    pub key_path: String,
    pub indexes: BTreeMap<String, IndexSchema>,
}

/// One secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Record field holding the index key.
    pub key_path: String,
    /// If the field is an array, index each element separately.
    pub multi_entry: bool,
}

impl Catalog {
    pub fn store(&self, name: &str) -> Result<&StoreSchema> {
        self.stores
            .get(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> Result<&mut StoreSchema> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn index(&self, store: &str, index: &str) -> Result<&IndexSchema> {
        self.store(store)?
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: store.to_string(),
                index: index.to_string(),
            })
    }

    pub fn has_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

impl StoreSchema {
    pub fn new(key_path: &str) -> Self {
        Self {
            key_path: key_path.to_string(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }
}

/// Look up a top-level field of a CBOR map.
pub(crate) fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(name))
        .map(|(_, v)| v)
}

/// Extract the primary key of a record.
pub(crate) fn primary_key(schema: &StoreSchema, value: &Value) -> Result<Key> {
    field(value, &schema.key_path)
        .and_then(Key::from_value)
        .ok_or_else(|| {
            StoreError::InvalidData(format!(
                "record has no valid key at `{}`",
                schema.key_path
            ))
        })
}

/// Extract the index keys of a record. Values that are not valid keys
/// produce no entry.
pub(crate) fn index_keys(schema: &IndexSchema, value: &Value) -> Vec<Key> {
    let Some(field) = field(value, &schema.key_path) else {
        return Vec::new();
    };
    match (schema.multi_entry, field) {
        (true, Value::Array(items)) => {
            let mut keys: Vec<Key> = items.iter().filter_map(Key::from_value).collect();
            keys.sort();
            keys.dedup();
            keys
        }
        _ => Key::from_value(field).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Value {
        Value::Map(vec![
            (Value::Text("id".into()), Value::Integer(7.into())),
            (
                Value::Text("numbers".into()),
                Value::Array(vec![
                    Value::Array(vec![Value::Text("+2".into()), Value::Integer(1.into())]),
                    Value::Array(vec![Value::Null, Value::Integer(1.into())]),
                    Value::Array(vec![Value::Text("+1".into()), Value::Integer(1.into())]),
                    Value::Array(vec![Value::Text("+2".into()), Value::Integer(1.into())]),
                ]),
            ),
        ])
    }

    #[test]
    fn test_primary_key() {
        let schema = StoreSchema::new("id");
        assert_eq!(primary_key(&schema, &record()).unwrap(), Key::Int(7));
        let schema = StoreSchema::new("missing");
        assert!(primary_key(&schema, &record()).is_err());
    }

    #[test]
    fn test_multi_entry_skips_invalid_and_dedups() {
        let schema = IndexSchema {
            key_path: "numbers".into(),
            multi_entry: true,
        };
        assert_eq!(
            index_keys(&schema, &record()),
            vec![Key::pair("+1", 1), Key::pair("+2", 1)]
        );
    }

    #[test]
    fn test_plain_index_over_array_is_one_key() {
        let schema = IndexSchema {
            key_path: "numbers".into(),
            multi_entry: false,
        };
        // The array contains a null, so it is not a valid key.
        assert!(index_keys(&schema, &record()).is_empty());

        let schema = IndexSchema {
            key_path: "id".into(),
            multi_entry: false,
        };
        assert_eq!(index_keys(&schema, &record()), vec![Key::Int(7)]);
    }

    #[test]
    fn test_unknown_names() {
        let catalog = Catalog::default();
        assert!(matches!(catalog.store("sms"), Err(StoreError::UnknownStore(_))));
    }
}
