//! In-memory implementation of the backend traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Clones share the
//! same data, so a test can "reopen" a database by cloning the backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::{ByteRange, Direction, KvBackend, KvRead, KvWrite};

type Map = BTreeMap<Vec<u8>, Bytes>;

/// In-memory backend.
///
/// Thread-safe via RwLock. Writers hold the write lock for the whole
/// transaction, so writes are serialized and readers never see a partial
/// write.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    map: Arc<RwLock<Map>>,
    fail_next_commit: Arc<AtomicBool>,
    scans: Arc<ScanHooks>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write transaction fail after its closure has run.
    ///
    /// Its writes are rolled back and the write returns
    /// [`StoreError::CommitFailed`].
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Let `n` more scans through read transactions succeed, then fail
    /// every later one with [`StoreError::ReadFailed`].
    pub fn fail_scans_after(&self, n: usize) {
        self.scans.set(n, ScanAction::Fail);
    }

    /// Let `n` more scans through read transactions run, then block later
    /// ones until the returned hold is released or dropped. A held scan
    /// keeps its read transaction open.
    pub fn hold_scans_after(&self, n: usize) -> ScanHold {
        self.scans.set(n, ScanAction::Hold);
        ScanHold {
            scans: self.scans.clone(),
        }
    }

    /// Number of raw entries, for diagnostics.
    pub fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanAction {
    Fail,
    Hold,
}

#[derive(Debug, Default)]
struct ScanHook {
    /// Scans still let through before `action` applies.
    remaining: usize,
    action: Option<ScanAction>,
}

#[derive(Debug, Default)]
struct ScanHooks {
    hook: Mutex<ScanHook>,
    released: Condvar,
}

impl ScanHooks {
    fn set(&self, remaining: usize, action: ScanAction) {
        if let Ok(mut hook) = self.hook.lock() {
            *hook = ScanHook {
                remaining,
                action: Some(action),
            };
        }
    }

    fn clear(&self) {
        if let Ok(mut hook) = self.hook.lock() {
            *hook = ScanHook::default();
        }
        self.released.notify_all();
    }

    fn before_scan(&self) -> Result<()> {
        let mut hook = self.hook.lock().map_err(poisoned)?;
        loop {
            let action = hook.action;
            match action {
                None => return Ok(()),
                Some(_) if hook.remaining > 0 => {
                    hook.remaining -= 1;
                    return Ok(());
                }
                Some(ScanAction::Fail) => {
                    return Err(StoreError::ReadFailed("injected failure".into()))
                }
                Some(ScanAction::Hold) => {
                    hook = self.released.wait(hook).map_err(poisoned)?;
                }
            }
        }
    }
}

/// Blocks scans of a [`MemoryBackend`] until released or dropped.
#[must_use = "dropping the hold releases the blocked scans"]
pub struct ScanHold {
    scans: Arc<ScanHooks>,
}

impl ScanHold {
    pub fn release(self) {}
}

impl Drop for ScanHold {
    fn drop(&mut self) {
        self.scans.clear();
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Lock(e.to_string())
}

fn slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn scan_map(
    map: &Map,
    range: &ByteRange,
    direction: Direction,
    limit: Option<usize>,
) -> Vec<(Vec<u8>, Bytes)> {
    // BTreeMap::range panics on inverted bounds.
    if range.is_empty() {
        return Vec::new();
    }
    let limit = limit.unwrap_or(usize::MAX);
    let iter = map.range::<[u8], _>((slice_bound(&range.start), slice_bound(&range.end)));
    let clone = |(k, v): (&Vec<u8>, &Bytes)| (k.clone(), v.clone());
    match direction {
        Direction::Next => iter.take(limit).map(clone).collect(),
        Direction::Prev => iter.rev().take(limit).map(clone).collect(),
    }
}

struct MemoryReader<'a> {
    map: &'a Map,
    scans: &'a ScanHooks,
}

impl KvRead for MemoryReader<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.map.get(key).cloned())
    }

    fn scan(
        &self,
        range: &ByteRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>> {
        self.scans.before_scan()?;
        Ok(scan_map(self.map, range, direction, limit))
    }
}

struct MemoryWriter<'a> {
    map: &'a mut Map,
    /// Previous value of every key touched, oldest first.
    undo: Vec<(Vec<u8>, Option<Bytes>)>,
}

impl MemoryWriter<'_> {
    fn rollback(self) {
        let MemoryWriter { map, undo } = self;
        for (key, previous) in undo.into_iter().rev() {
            match previous {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

impl KvRead for MemoryWriter<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.map.get(key).cloned())
    }

    fn scan(
        &self,
        range: &ByteRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>> {
        Ok(scan_map(self.map, range, direction, limit))
    }
}

impl KvWrite for MemoryWriter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let previous = self.map.insert(key.to_vec(), Bytes::copy_from_slice(value));
        self.undo.push((key.to_vec(), previous));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        match self.map.remove(key) {
            Some(previous) => {
                self.undo.push((key.to_vec(), Some(previous)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn as_read(&self) -> &dyn KvRead {
        self
    }
}

impl KvBackend for MemoryBackend {
    fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn KvRead) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let map = self.map.read().map_err(poisoned)?;
        f(&MemoryReader {
            map: &*map,
            scans: &self.scans,
        })
    }

    fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn KvWrite) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut map = self.map.write().map_err(poisoned)?;
        let mut writer = MemoryWriter {
            map: &mut *map,
            undo: Vec::new(),
        };
        match f(&mut writer) {
            Ok(value) => {
                if self.fail_next_commit.swap(false, Ordering::SeqCst) {
                    writer.rollback();
                    return Err(StoreError::CommitFailed("injected failure".into()).into());
                }
                Ok(value)
            }
            Err(e) => {
                writer.rollback();
                Err(e)
            }
        }
    }
}
