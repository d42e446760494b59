//! The transaction gateway: lazy open, migration, and scoped transactions.
//!
//! The database is opened on first use and cached for the lifetime of the
//! gateway. Every transaction runs on the blocking pool so backend I/O never
//! stalls the async runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use msgstore_core::MessageId;
use msgstore_store::{Database, KvBackend, Transaction};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{DbError, Result};
use crate::migration;
use crate::schema::{CURRENT_VERSION, MESSAGES, STORE_MESSAGES};

/// The high-water mark of assigned message ids.
///
/// Seeded from the greatest stored key on open. Allocation is a single
/// atomic increment, so ids are never handed out twice.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    fn seed(&self, last: u64) {
        self.last.fetch_max(last, Ordering::SeqCst);
    }

    pub(crate) fn next(&self) -> MessageId {
        MessageId::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn last(&self) -> MessageId {
        MessageId::new(self.last.load(Ordering::SeqCst))
    }
}

pub(crate) struct Gateway<B: KvBackend> {
    backend: Arc<B>,
    db: OnceCell<Arc<Database<B>>>,
    ids: IdAllocator,
}

impl<B: KvBackend> Gateway<B> {
    pub(crate) fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            db: OnceCell::new(),
            ids: IdAllocator::default(),
        }
    }

    /// Open the database on first call; later calls return the cached
    /// handle. A failed open is not cached, so the next call retries.
    pub(crate) async fn ensure_open(&self) -> Result<Arc<Database<B>>> {
        let db = self
            .db
            .get_or_try_init(|| async {
                let backend = self.backend.clone();
                let (db, last) = blocking(move || {
                    let db = Database::open(backend, CURRENT_VERSION, migration::migrate)?;
                    let last = db.read(MESSAGES, |txn| txn.last_key(STORE_MESSAGES))?;
                    Ok((db, last))
                })
                .await?;
                let last = last.as_ref().and_then(MessageId::from_key).map_or(0, |id| id.get());
                self.ids.seed(last);
                info!(version = db.version(), last_id = last, "message database open");
                Ok::<_, DbError>(Arc::new(db))
            })
            .await?;
        Ok(db.clone())
    }

    /// Allocate the next message id. The counter advances even if the
    /// write that uses the id later fails.
    pub(crate) fn next_id(&self) -> MessageId {
        self.ids.next()
    }

    pub(crate) fn last_id(&self) -> MessageId {
        self.ids.last()
    }

    /// Run `f` in a read-only transaction over `stores`.
    pub(crate) async fn read<T, F>(&self, stores: &'static [&'static str], f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let db = self.ensure_open().await?;
        blocking(move || db.read(stores, f)).await
    }

    /// Run `f` in a read-write transaction over `stores`. Either every
    /// write in `f` commits or none does.
    pub(crate) async fn write<T, F>(&self, stores: &'static [&'static str], f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let db = self.ensure_open().await?;
        blocking(move || db.write(stores, f)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DbError::Internal(format!("spawn_blocking failed: {}", e)))?
}
