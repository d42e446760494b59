//! Scoped transactions over object stores and their indexes.
//!
//! A [`Transaction`] wraps a backend reader or writer for the duration of a
//! [`crate::Database::read`] or [`crate::Database::write`] call. It maps
//! records and index entries onto the flat keyspace and keeps every index
//! in step with every record write.

use std::borrow::Cow;

use ciborium::value::Value;
use msgstore_core::{Key, KeyRange};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::catalog::{self, Catalog, IndexSchema, StoreSchema};
use crate::error::{Result, StoreError};
use crate::keyspace;
use crate::traits::{Direction, KvRead, KvWrite};

/// Entries fetched per page by the `*_all` helpers.
const PAGE: usize = 256;

/// One index entry: the index key and the primary key it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Key,
    pub primary_key: Key,
}

enum KvHandle<'a> {
    Read(&'a dyn KvRead),
    Write(&'a mut dyn KvWrite),
}

/// A transaction scoped to a set of object stores.
pub struct Transaction<'a> {
    kv: KvHandle<'a>,
    catalog: Cow<'a, Catalog>,
    /// `None` grants every store (upgrade transactions).
    scope: Option<&'a [&'a str]>,
    upgrade: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn read_only(
        kv: &'a dyn KvRead,
        catalog: &'a Catalog,
        scope: &'a [&'a str],
    ) -> Self {
        Self {
            kv: KvHandle::Read(kv),
            catalog: Cow::Borrowed(catalog),
            scope: Some(scope),
            upgrade: false,
        }
    }

    pub(crate) fn read_write(
        kv: &'a mut dyn KvWrite,
        catalog: &'a Catalog,
        scope: &'a [&'a str],
    ) -> Self {
        Self {
            kv: KvHandle::Write(kv),
            catalog: Cow::Borrowed(catalog),
            scope: Some(scope),
            upgrade: false,
        }
    }

    pub(crate) fn upgrade(kv: &'a mut dyn KvWrite, catalog: Catalog) -> Self {
        Self {
            kv: KvHandle::Write(kv),
            catalog: Cow::Owned(catalog),
            scope: None,
            upgrade: true,
        }
    }

    pub(crate) fn into_catalog(self) -> Catalog {
        self.catalog.into_owned()
    }

    /// The schema as seen by this transaction.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.kv, KvHandle::Read(_))
    }

    fn reader(&self) -> &dyn KvRead {
        match &self.kv {
            KvHandle::Read(kv) => *kv,
            KvHandle::Write(kv) => kv.as_read(),
        }
    }

    fn writer(&mut self) -> Result<&mut (dyn KvWrite + 'a)> {
        match &mut self.kv {
            KvHandle::Write(kv) => Ok(&mut **kv),
            KvHandle::Read(_) => Err(StoreError::ReadOnly),
        }
    }

    fn schema(&self, store: &str) -> Result<&StoreSchema> {
        if let Some(scope) = self.scope {
            if !scope.contains(&store) {
                return Err(StoreError::NotInScope(store.to_string()));
            }
        }
        self.catalog.store(store)
    }

    fn require_upgrade(&self, operation: &'static str) -> Result<()> {
        if self.upgrade {
            Ok(())
        } else {
            Err(StoreError::UpgradeOnly(operation))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the record stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, store: &str, key: &Key) -> Result<Option<T>> {
        self.schema(store)?;
        match self.reader().get(&keyspace::record_key(store, key))? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Insert or replace a record. Returns its primary key.
    pub fn put<T: Serialize>(&mut self, store: &str, record: &T) -> Result<Key> {
        self.write_record(store, record, false)
    }

    /// Insert a record that must not exist yet.
    pub fn add<T: Serialize>(&mut self, store: &str, record: &T) -> Result<Key> {
        self.write_record(store, record, true)
    }

    fn write_record<T: Serialize>(&mut self, store: &str, record: &T, add: bool) -> Result<Key> {
        let schema = self.schema(store)?.clone();
        self.writer()?;

        let value = Value::serialized(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let pk = catalog::primary_key(&schema, &value)?;
        let record_key = keyspace::record_key(store, &pk);

        if let Some(previous) = self.reader().get(&record_key)? {
            if add {
                return Err(StoreError::Constraint(format!(
                    "key {} already exists in `{}`",
                    pk, store
                )));
            }
            let previous: Value = decode(&previous)?;
            self.remove_index_entries(store, &schema, &pk, &previous)?;
        }

        let bytes = encode(&value)?;
        let kv = self.writer()?;
        kv.put(&record_key, &bytes)?;
        for (name, index) in &schema.indexes {
            for key in catalog::index_keys(index, &value) {
                kv.put(&keyspace::index_entry_key(store, name, &key, &pk), &[])?;
            }
        }
        Ok(pk)
    }

    fn remove_index_entries(
        &mut self,
        store: &str,
        schema: &StoreSchema,
        pk: &Key,
        value: &Value,
    ) -> Result<()> {
        let kv = self.writer()?;
        for (name, index) in &schema.indexes {
            for key in catalog::index_keys(index, value) {
                kv.delete(&keyspace::index_entry_key(store, name, &key, pk))?;
            }
        }
        Ok(())
    }

    /// Delete the record under `key` and its index entries. Returns whether
    /// a record was removed.
    pub fn delete(&mut self, store: &str, key: &Key) -> Result<bool> {
        let schema = self.schema(store)?.clone();
        self.writer()?;
        let record_key = keyspace::record_key(store, key);
        let Some(previous) = self.reader().get(&record_key)? else {
            return Ok(false);
        };
        let previous: Value = decode(&previous)?;
        self.remove_index_entries(store, &schema, key, &previous)?;
        self.writer()?.delete(&record_key)
    }

    /// Scan records by primary key, resuming strictly after `after`.
    pub fn scan_records<T: DeserializeOwned>(
        &self,
        store: &str,
        range: &KeyRange,
        direction: Direction,
        after: Option<&Key>,
        limit: Option<usize>,
    ) -> Result<Vec<(Key, T)>> {
        self.schema(store)?;
        let prefix = keyspace::store_prefix(store);
        let mut bytes = keyspace::record_range(&prefix, range);
        if let Some(after) = after {
            resume(&mut bytes, keyspace::record_key(store, after), direction);
        }
        self.reader()
            .scan(&bytes, direction, limit)?
            .into_iter()
            .map(|(raw, value)| Ok((keyspace::decode_record_key(&prefix, &raw)?, decode(&value)?)))
            .collect()
    }

    /// Every record of a store in primary-key order.
    pub fn scan_all<T: DeserializeOwned>(&self, store: &str) -> Result<Vec<(Key, T)>> {
        let mut out = Vec::new();
        loop {
            let after = out.last().map(|(k, _): &(Key, T)| k.clone());
            let page = self.scan_records(
                store,
                &KeyRange::all(),
                Direction::Next,
                after.as_ref(),
                Some(PAGE),
            )?;
            let done = page.len() < PAGE;
            out.extend(page);
            if done {
                return Ok(out);
            }
        }
    }

    /// The greatest primary key in a store.
    pub fn last_key(&self, store: &str) -> Result<Option<Key>> {
        self.schema(store)?;
        let prefix = keyspace::store_prefix(store);
        let range = keyspace::record_range(&prefix, &KeyRange::all());
        match self.reader().scan(&range, Direction::Prev, Some(1))?.first() {
            Some((raw, _)) => keyspace::decode_record_key(&prefix, raw).map(Some),
            None => Ok(None),
        }
    }

    /// Number of records in a store.
    pub fn count(&self, store: &str) -> Result<usize> {
        self.schema(store)?;
        let prefix = keyspace::store_prefix(store);
        let range = keyspace::record_range(&prefix, &KeyRange::all());
        Ok(self.reader().scan(&range, Direction::Next, None)?.len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Indexes
    // ─────────────────────────────────────────────────────────────────────────

    /// A key cursor page over an index.
    ///
    /// Entries are ordered by `(index_key, primary_key)` in `direction`.
    /// With `after`, the scan resumes strictly past that entry.
    pub fn scan_index(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
        direction: Direction,
        after: Option<&IndexEntry>,
        limit: Option<usize>,
    ) -> Result<Vec<IndexEntry>> {
        self.schema(store)?;
        self.catalog.index(store, index)?;
        let prefix = keyspace::index_prefix(store, index);
        let mut bytes = keyspace::index_range(&prefix, range);
        if let Some(after) = after {
            let position = keyspace::index_entry_key(store, index, &after.key, &after.primary_key);
            resume(&mut bytes, position, direction);
        }
        self.reader()
            .scan(&bytes, direction, limit)?
            .into_iter()
            .map(|(raw, _)| {
                let (key, primary_key) = keyspace::decode_index_entry(&prefix, &raw)?;
                Ok(IndexEntry { key, primary_key })
            })
            .collect()
    }

    /// Every record reachable through an index range, in index order.
    pub fn get_all_by_index<T: DeserializeOwned>(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
        direction: Direction,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut after: Option<IndexEntry> = None;
        loop {
            let page = self.scan_index(store, index, range, direction, after.as_ref(), Some(PAGE))?;
            let done = page.len() < PAGE;
            for entry in &page {
                let record = self.get(store, &entry.primary_key)?.ok_or_else(|| {
                    StoreError::InvalidData(format!(
                        "index `{}` points at missing key {}",
                        index, entry.primary_key
                    ))
                })?;
                out.push(record);
            }
            after = page.last().cloned();
            if done {
                return Ok(out);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Schema changes (upgrade only)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_store(&self, store: &str) -> bool {
        self.catalog.has_store(store)
    }

    pub fn has_index(&self, store: &str, index: &str) -> bool {
        self.catalog.index(store, index).is_ok()
    }

    /// Create an empty object store.
    pub fn create_store(&mut self, store: &str, key_path: &str) -> Result<()> {
        self.require_upgrade("create_store")?;
        if self.catalog.has_store(store) {
            return Err(StoreError::Constraint(format!("store `{}` exists", store)));
        }
        self.catalog
            .to_mut()
            .stores
            .insert(store.to_string(), StoreSchema::new(key_path));
        Ok(())
    }

    /// Create an index, populating it from the records already stored.
    pub fn create_index(
        &mut self,
        store: &str,
        index: &str,
        key_path: &str,
        multi_entry: bool,
    ) -> Result<()> {
        self.require_upgrade("create_index")?;
        if self.has_index(store, index) {
            return Err(StoreError::Constraint(format!(
                "index `{}` exists on `{}`",
                index, store
            )));
        }
        let schema = IndexSchema {
            key_path: key_path.to_string(),
            multi_entry,
        };

        let records: Vec<(Key, Value)> = self.scan_all(store)?;
        let kv = self.writer()?;
        for (pk, value) in &records {
            for key in catalog::index_keys(&schema, value) {
                kv.put(&keyspace::index_entry_key(store, index, &key, pk), &[])?;
            }
        }

        self.catalog
            .to_mut()
            .store_mut(store)?
            .indexes
            .insert(index.to_string(), schema);
        Ok(())
    }

    /// Drop an index and all its entries.
    pub fn delete_index(&mut self, store: &str, index: &str) -> Result<()> {
        self.require_upgrade("delete_index")?;
        self.catalog.index(store, index)?;
        let prefix = keyspace::index_prefix(store, index);
        let range = crate::traits::ByteRange::prefix(&prefix);
        let entries = self.reader().scan(&range, Direction::Next, None)?;
        let kv = self.writer()?;
        for (raw, _) in entries {
            kv.delete(&raw)?;
        }
        self.catalog
            .to_mut()
            .store_mut(store)?
            .indexes
            .remove(index);
        Ok(())
    }
}

fn resume(range: &mut crate::traits::ByteRange, position: Vec<u8>, direction: Direction) {
    match direction {
        Direction::Next => range.start = std::ops::Bound::Excluded(position),
        Direction::Prev => range.end = std::ops::Bound::Excluded(position),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}
