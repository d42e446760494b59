//! SQLite implementation of the backend traits.
//!
//! This is the persistent backend. It uses rusqlite with bundled SQLite;
//! the connection sits behind a mutex, and async callers reach it through
//! `tokio::task::spawn_blocking`.

use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ByteRange, Direction, KvBackend, KvRead, KvWrite};

/// SQLite-based backend.
///
/// Thread-safe via internal Mutex. Every transaction holds the connection
/// for its whole duration.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and the table layout if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(format!("sqlite connection: {}", e)))
    }
}

fn get(conn: &Connection, key: &[u8]) -> Result<Option<Bytes>> {
    let value: Option<Vec<u8>> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value.map(Bytes::from))
}

fn scan(
    conn: &Connection,
    range: &ByteRange,
    direction: Direction,
    limit: Option<usize>,
) -> Result<Vec<(Vec<u8>, Bytes)>> {
    if range.is_empty() {
        return Ok(Vec::new());
    }

    let mut clauses = Vec::new();
    let mut values = Vec::new();
    match &range.start {
        Bound::Included(k) => {
            clauses.push("key >= ?");
            values.push(Value::Blob(k.clone()));
        }
        Bound::Excluded(k) => {
            clauses.push("key > ?");
            values.push(Value::Blob(k.clone()));
        }
        Bound::Unbounded => {}
    }
    match &range.end {
        Bound::Included(k) => {
            clauses.push("key <= ?");
            values.push(Value::Blob(k.clone()));
        }
        Bound::Excluded(k) => {
            clauses.push("key < ?");
            values.push(Value::Blob(k.clone()));
        }
        Bound::Unbounded => {}
    }

    let mut sql = String::from("SELECT key, value FROM kv");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(match direction {
        Direction::Next => " ORDER BY key ASC",
        Direction::Prev => " ORDER BY key DESC",
    });
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?
        .map(|row| row.map(|(k, v)| (k, Bytes::from(v))))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

struct SqliteReader<'a> {
    conn: &'a Connection,
}

impl KvRead for SqliteReader<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        get(self.conn, key)
    }

    fn scan(
        &self,
        range: &ByteRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>> {
        scan(self.conn, range, direction, limit)
    }
}

struct SqliteWriter<'a> {
    conn: &'a Connection,
}

impl KvRead for SqliteWriter<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        get(self.conn, key)
    }

    fn scan(
        &self,
        range: &ByteRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Bytes)>> {
        scan(self.conn, range, direction, limit)
    }
}

impl KvWrite for SqliteWriter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn as_read(&self) -> &dyn KvRead {
        self
    }
}

impl KvBackend for SqliteBackend {
    fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn KvRead) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        // Dropped without commit; the transaction only pins a snapshot.
        let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
        f(&SqliteReader { conn: &tx })
    }

    fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn KvWrite) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let value = f(&mut SqliteWriter { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(entries: Vec<(Vec<u8>, Bytes)>) -> Vec<Vec<u8>> {
        entries.into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_put_get_overwrite() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.write(|kv| kv.put(b"a", b"1")).unwrap();
        backend.write(|kv| kv.put(b"a", b"2")).unwrap();
        let value = backend.read(|kv| kv.get(b"a")).unwrap();
        assert_eq!(value.as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn test_blob_order_is_memcmp() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend
            .write(|kv| {
                kv.put(&[0x02, 0xFF], b"")?;
                kv.put(&[0x02], b"")?;
                kv.put(&[0x02, 0x00], b"")?;
                kv.put(&[0x01, 0xFF, 0xFF], b"")
            })
            .unwrap();

        let all = ByteRange::new(Bound::Unbounded, Bound::Unbounded);
        let forward = backend.read(|kv| kv.scan(&all, Direction::Next, None)).unwrap();
        assert_eq!(
            keys(forward),
            vec![vec![0x01, 0xFF, 0xFF], vec![0x02], vec![0x02, 0x00], vec![0x02, 0xFF]]
        );

        let prefix = ByteRange::prefix(&[0x02]);
        let backward = backend
            .read(|kv| kv.scan(&prefix, Direction::Prev, Some(2)))
            .unwrap();
        assert_eq!(keys(backward), vec![vec![0x02, 0xFF], vec![0x02, 0x00]]);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.write(|kv| kv.put(b"keep", b"1")).unwrap();

        let result: std::result::Result<(), StoreError> = backend.write(|kv| {
            kv.put(b"new", b"1")?;
            kv.delete(b"keep")?;
            Err(StoreError::InvalidData("abort".into()))
        });
        assert!(result.is_err());

        assert!(backend.read(|kv| kv.get(b"new")).unwrap().is_none());
        assert!(backend.read(|kv| kv.get(b"keep")).unwrap().is_some());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.write(|kv| kv.put(b"k", b"v")).unwrap();
        }
        let backend = SqliteBackend::open(&path).unwrap();
        let value = backend.read(|kv| kv.get(b"k")).unwrap();
        assert_eq!(value.as_deref(), Some(&b"v"[..]));
    }
}
