//! The message database: the caller-facing API.
//!
//! Every operation is async. Mutations run in one read-write transaction
//! together with the rollup maintenance they trigger. Message lists are
//! driven by background cursor tasks and pulled one message at a time.

use std::path::Path;
use std::sync::Arc;

use msgstore_core::{
    prepare_received, prepare_sending, Delivery, DeliveryStatus, KeyRange, ListId, Message,
    MessageFilter, MessageId, MessageRecord, PhoneContext, RawMessage, ThreadRecord,
};
use msgstore_store::{Direction, KvBackend, MemoryBackend, SqliteBackend, Transaction};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::error::{DbError, Result};
use crate::gateway::Gateway;
use crate::list::{lock, Head, ListRegistry, ListState, Next, StopGuard};
use crate::query::{self, QueryPlan, QueryState};
use crate::rollup;
use crate::schema::{
    INDEX_TIMESTAMP, MESSAGES, MESSAGES_AND_THREADS, STORE_MESSAGES, STORE_THREADS, THREADS,
};

/// Outcome of [`MessageDatabase::create_message_list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListCreation {
    /// The query produced at least one message. Further messages are
    /// pulled with [`MessageDatabase::get_next_message_in_list`].
    Created { list_id: ListId, first: Message },
    /// Nothing matched; no list was registered.
    Empty,
}

/// Debugging snapshot of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub open_lists: usize,
    pub last_message_id: MessageId,
}

/// A message database over a key-value backend.
pub struct MessageDatabase<B: KvBackend> {
    gateway: Arc<Gateway<B>>,
    phone: Arc<dyn PhoneContext>,
    lists: ListRegistry,
    config: DatabaseConfig,
}

impl<B: KvBackend> MessageDatabase<B> {
    /// Create a database over `backend`. Nothing is opened until the first
    /// operation (or [`MessageDatabase::open`]).
    pub fn new(backend: B, phone: Arc<dyn PhoneContext>, config: DatabaseConfig) -> Self {
        Self::with_shared_backend(Arc::new(backend), phone, config)
    }

    pub fn with_shared_backend(
        backend: Arc<B>,
        phone: Arc<dyn PhoneContext>,
        mut config: DatabaseConfig,
    ) -> Self {
        // A zero page would never make progress.
        config.scan_batch_size = config.scan_batch_size.max(1);
        Self {
            gateway: Arc::new(Gateway::new(backend)),
            phone,
            lists: ListRegistry::default(),
            config,
        }
    }

    /// Open the database now, running any pending migrations.
    pub async fn open(&self) -> Result<()> {
        self.gateway.ensure_open().await.map(|_| ())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    /// Store an incoming message. Returns its assigned id.
    pub async fn save_received(&self, raw: RawMessage) -> Result<MessageId> {
        let record = prepare_received(raw, self.phone.as_ref())?;
        self.save(record).await
    }

    /// Store an outgoing message. Returns its assigned id.
    pub async fn save_sending(&self, raw: RawMessage) -> Result<MessageId> {
        let record = prepare_sending(raw, self.phone.as_ref())?;
        self.save(record).await
    }

    async fn save(&self, mut record: MessageRecord) -> Result<MessageId> {
        self.gateway.ensure_open().await?;
        let id = self.gateway.next_id();
        record.id = id;
        self.gateway
            .write(MESSAGES_AND_THREADS, move |txn| {
                txn.put(STORE_MESSAGES, &record)?;
                rollup::on_save(txn, &record)
            })
            .await?;
        debug!(id = %id, "saved message");
        Ok(id)
    }

    pub async fn get_message(&self, id: MessageId) -> Result<Message> {
        self.gateway
            .read(MESSAGES, move |txn| load(txn, id).map(Message::from))
            .await
    }

    /// Update the delivery state of a message. Unchanged values are not
    /// written.
    pub async fn set_delivery(
        &self,
        id: MessageId,
        delivery: Delivery,
        status: DeliveryStatus,
    ) -> Result<Message> {
        self.gateway
            .write(MESSAGES, move |txn| {
                let mut record = load(txn, id)?;
                if record.set_delivery(delivery, status) {
                    txn.put(STORE_MESSAGES, &record)?;
                    debug!(id = %id, ?delivery, ?status, "updated delivery");
                }
                Ok(Message::from(record))
            })
            .await
    }

    /// Delete a message. Returns `false` if there was nothing to delete.
    pub async fn delete_message(&self, id: MessageId) -> Result<bool> {
        self.gateway
            .write(MESSAGES_AND_THREADS, move |txn| {
                let record = match load(txn, id) {
                    Ok(record) => record,
                    Err(DbError::MessageNotFound(_)) => return Ok(false),
                    Err(e) => return Err(e),
                };
                txn.delete(STORE_MESSAGES, &id.to_key())?;
                rollup::on_delete(txn, &record)?;
                debug!(id = %id, "deleted message");
                Ok(true)
            })
            .await
    }

    /// Set the read flag of a message. Returns the resulting value.
    pub async fn mark_read(&self, id: MessageId, value: bool) -> Result<bool> {
        self.gateway
            .write(MESSAGES_AND_THREADS, move |txn| {
                let mut record = load(txn, id)?;
                if record.set_read(value) {
                    txn.put(STORE_MESSAGES, &record)?;
                    rollup::on_read_change(txn, &record, value)?;
                    debug!(id = %id, read = value, "marked message");
                }
                Ok(value)
            })
            .await
    }

    /// Every thread rollup, oldest first.
    pub async fn get_thread_list(&self) -> Result<Vec<ThreadRecord>> {
        self.gateway
            .read(THREADS, |txn| {
                Ok(txn.get_all_by_index(
                    STORE_THREADS,
                    INDEX_TIMESTAMP,
                    &KeyRange::all(),
                    Direction::Next,
                )?)
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Message lists
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a query and wait for its first result.
    ///
    /// A list is registered only once a first message exists. Dropping the
    /// returned future before it completes stops the query.
    pub async fn create_message_list(
        &self,
        filter: MessageFilter,
        reverse: bool,
    ) -> Result<ListCreation> {
        self.gateway.ensure_open().await?;
        let plan = QueryPlan::new(&filter, reverse);
        let list = ListState::new(QueryState::new(&plan)).shared();
        let Next::Wait(rx) = lock(&list)?.next() else {
            return Err(DbError::Internal("new list is not waiting".into()));
        };

        let guard = StopGuard::new(list.clone());
        let sources = plan.sources();
        debug!(?filter, reverse, cursors = sources.len(), "starting message list");
        for (source, spec) in sources {
            tokio::spawn(query::run(
                self.gateway.clone(),
                list.clone(),
                source,
                spec,
                plan.direction,
                self.config.scan_batch_size,
            ));
        }

        let head = rx
            .await
            .map_err(|_| DbError::Internal("message list dropped before its first result".into()))?;
        match head {
            Head::Message(id) => {
                let first = self.get_message(id).await?;
                let list_id = self.lists.register(guard.disarm())?;
                debug!(list_id = %list_id, first = %id, "created message list");
                Ok(ListCreation::Created { list_id, first })
            }
            Head::End => Ok(ListCreation::Empty),
            Head::Failed(reason) => Err(DbError::QueryFailed(reason)),
        }
    }

    /// The next message of a list, or `None` at its end.
    ///
    /// Only one request may wait on a list at a time. A failed list keeps
    /// reporting its failure.
    pub async fn get_next_message_in_list(&self, list_id: ListId) -> Result<Option<Message>> {
        let list = self
            .lists
            .get(list_id)?
            .ok_or(DbError::ListNotFound(list_id))?;
        let next = lock(&list)?.next();
        let head = match next {
            Next::Ready(head) => head,
            Next::Busy => return Err(DbError::RequestPending(list_id)),
            Next::Wait(rx) => rx.await.map_err(|_| DbError::Cancelled(list_id))?,
        };
        match head {
            Head::Message(id) => {
                let message = self.get_message(id).await?;
                if lock(&list)?.is_stopped() {
                    return Err(DbError::Cancelled(list_id));
                }
                Ok(Some(message))
            }
            Head::End => Ok(None),
            Head::Failed(reason) => Err(DbError::QueryFailed(reason)),
        }
    }

    /// Stop a list and forget it.
    pub fn clear_message_list(&self, list_id: ListId) -> Result<()> {
        let list = self
            .lists
            .remove(list_id)?
            .ok_or(DbError::ListNotFound(list_id))?;
        lock(&list)?.stop();
        debug!(list_id = %list_id, "cleared message list");
        Ok(())
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            open_lists: self.lists.len(),
            last_message_id: self.gateway.last_id(),
        }
    }
}

impl MessageDatabase<SqliteBackend> {
    /// A database in the SQLite file at `path`.
    pub fn open_sqlite(
        path: impl AsRef<Path>,
        phone: Arc<dyn PhoneContext>,
        config: DatabaseConfig,
    ) -> Result<Self> {
        let backend = SqliteBackend::open(path)?;
        Ok(Self::new(backend, phone, config))
    }

    /// A database in the file named by [`DatabaseConfig::sqlite_path`].
    pub fn open_sqlite_default(
        phone: Arc<dyn PhoneContext>,
        config: DatabaseConfig,
    ) -> Result<Self> {
        let path = config
            .sqlite_path
            .clone()
            .ok_or_else(|| DbError::Internal("no sqlite path configured".into()))?;
        Self::open_sqlite(path, phone, config)
    }
}

impl MessageDatabase<MemoryBackend> {
    /// A fresh in-memory database with default configuration.
    pub fn in_memory(phone: Arc<dyn PhoneContext>) -> Self {
        Self::new(MemoryBackend::new(), phone, DatabaseConfig::default())
    }
}

/// Fetch a message by id, checking that the stored record agrees.
fn load(txn: &Transaction<'_>, id: MessageId) -> Result<MessageRecord> {
    let record: MessageRecord = txn
        .get(STORE_MESSAGES, &id.to_key())?
        .ok_or(DbError::MessageNotFound(id))?;
    if record.id != id {
        warn!(expected = %id, found = %record.id, "stored record id mismatch");
        return Err(DbError::Inconsistent {
            expected: id,
            found: record.id,
        });
    }
    Ok(record)
}
