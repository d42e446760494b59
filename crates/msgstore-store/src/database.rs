//! Versioned database open and scoped transactions.

use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::error::{Result, StoreError};
use crate::keyspace::{self, META_CATALOG, META_VERSION};
use crate::traits::{KvBackend, KvRead};
use crate::transaction::Transaction;

/// An opened database: a backend plus the schema it was upgraded to.
pub struct Database<B: KvBackend> {
    backend: Arc<B>,
    catalog: Catalog,
    version: u32,
}

impl<B: KvBackend> Database<B> {
    /// Open the database at schema `version`.
    ///
    /// If the stored version is older, `upgrade(txn, old, new)` runs in one
    /// write transaction together with the version bump; if it fails,
    /// nothing is committed. A stored version newer than `version` fails
    /// with [`StoreError::VersionTooNew`].
    pub fn open<E, F>(backend: Arc<B>, version: u32, upgrade: F) -> std::result::Result<Self, E>
    where
        F: FnOnce(&mut Transaction<'_>, u32, u32) -> std::result::Result<(), E>,
        E: From<StoreError>,
    {
        let catalog = backend.write(|kv| -> std::result::Result<Catalog, E> {
            let stored = read_version(kv.as_read())?;
            if stored > version {
                return Err(StoreError::VersionTooNew {
                    stored,
                    supported: version,
                }
                .into());
            }
            let catalog = read_catalog(kv.as_read())?;
            if stored == version {
                return Ok(catalog);
            }

            info!(from = stored, to = version, "upgrading database schema");
            let mut txn = Transaction::upgrade(kv, catalog);
            upgrade(&mut txn, stored, version)?;
            let catalog = txn.into_catalog();

            kv.put(&keyspace::meta_key(META_VERSION), &version.to_be_bytes())?;
            let mut buf = Vec::new();
            ciborium::into_writer(&catalog, &mut buf)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            kv.put(&keyspace::meta_key(META_CATALOG), &buf)?;
            Ok(catalog)
        })?;

        Ok(Self {
            backend,
            catalog,
            version,
        })
    }

    /// Run `f` in a read-only transaction over `stores`.
    pub fn read<T, E, F>(&self, stores: &[&str], f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.backend.read(|kv| {
            let mut txn = Transaction::read_only(kv, &self.catalog, stores);
            f(&mut txn)
        })
    }

    /// Run `f` in a read-write transaction over `stores`. All of its writes
    /// commit, or none do.
    pub fn write<T, E, F>(&self, stores: &[&str], f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.backend.write(|kv| {
            let mut txn = Transaction::read_write(kv, &self.catalog, stores);
            f(&mut txn)
        })
    }

    /// The schema version this database was opened at.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

fn read_version(kv: &dyn KvRead) -> Result<u32> {
    match kv.get(&keyspace::meta_key(META_VERSION))? {
        None => Ok(0),
        Some(bytes) => {
            let raw: [u8; 4] = bytes[..].try_into().map_err(|_| {
                StoreError::InvalidData(format!("bad version bytes {}", hex::encode(&bytes)))
            })?;
            Ok(u32::from_be_bytes(raw))
        }
    }
}

fn read_catalog(kv: &dyn KvRead) -> Result<Catalog> {
    match kv.get(&keyspace::meta_key(META_CATALOG))? {
        None => Ok(Catalog::default()),
        Some(bytes) => ciborium::from_reader(&bytes[..])
            .map_err(|e| StoreError::Serialization(e.to_string())),
    }
}
