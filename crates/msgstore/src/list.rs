//! Open message lists.
//!
//! A list buffers the ids its cursors produce and serves them to one
//! request at a time. A request that arrives while the buffer is empty and
//! the scan is still running parks on a oneshot channel until the next id,
//! the end, or a failure arrives.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use msgstore_core::{ListId, MessageId};
use tokio::sync::oneshot;

use crate::error::{DbError, Result};
use crate::query::{QueryState, SourceId};

pub(crate) type SharedList = Arc<Mutex<ListState>>;

/// What a request receives from the head of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Head {
    Message(MessageId),
    End,
    Failed(String),
}

/// Outcome of asking a list for its next head.
#[derive(Debug)]
pub(crate) enum Next {
    Ready(Head),
    /// The scan is still running; the head arrives on this channel.
    Wait(oneshot::Receiver<Head>),
    /// Another request is already waiting.
    Busy,
}

#[derive(Debug)]
enum Slot {
    Id(MessageId),
    /// Stays at the head once reached.
    Failed(String),
}

#[derive(Debug)]
pub(crate) struct ListState {
    results: VecDeque<Slot>,
    /// Cursors may still produce results.
    processing: bool,
    /// The list was cleared; nothing reaches the caller any more.
    stop: bool,
    pending: Option<oneshot::Sender<Head>>,
    query: QueryState,
}

impl ListState {
    pub(crate) fn new(query: QueryState) -> Self {
        Self {
            results: VecDeque::new(),
            processing: true,
            stop: false,
            pending: None,
            query,
        }
    }

    pub(crate) fn shared(self) -> SharedList {
        Arc::new(Mutex::new(self))
    }

    /// Whether the cursor behind `source` should fetch another page.
    pub(crate) fn wants(&self, source: SourceId) -> bool {
        !self.stop && self.processing && self.query.wants(source)
    }

    /// A cursor yielded an entry. Returns whether that cursor should
    /// continue.
    pub(crate) fn on_entry(&mut self, source: SourceId, id: MessageId, ts: i64) -> bool {
        if self.stop || !self.processing {
            return false;
        }
        for id in self.query.on_entry(source, id, ts) {
            self.deliver(id);
        }
        if self.query.is_finished() {
            self.finish();
        }
        self.wants(source)
    }

    /// A cursor ran out of entries.
    pub(crate) fn on_done(&mut self, source: SourceId) {
        if self.stop || !self.processing {
            return;
        }
        for id in self.query.on_done(source) {
            self.deliver(id);
        }
        if self.query.is_finished() {
            self.finish();
        }
    }

    /// A cursor failed. Every later request sees the failure.
    pub(crate) fn fail(&mut self, reason: String) {
        if self.stop || !self.processing {
            return;
        }
        self.processing = false;
        self.query.abort();
        if let Some(tx) = self.pending.take() {
            let _ = tx.send(Head::Failed(reason.clone()));
        }
        self.results.push_back(Slot::Failed(reason));
    }

    /// Clear the list. A parked request is dropped, which its waiter sees
    /// as a closed channel.
    pub(crate) fn stop(&mut self) {
        self.stop = true;
        self.processing = false;
        self.query.abort();
        self.results.clear();
        self.pending = None;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stop
    }

    pub(crate) fn next(&mut self) -> Next {
        if let Some(tx) = &self.pending {
            if !tx.is_closed() {
                return Next::Busy;
            }
            // The waiter went away.
            self.pending = None;
        }
        match self.results.front() {
            Some(Slot::Failed(reason)) => Next::Ready(Head::Failed(reason.clone())),
            Some(Slot::Id(id)) => {
                let id = *id;
                self.results.pop_front();
                Next::Ready(Head::Message(id))
            }
            None if self.processing => {
                let (tx, rx) = oneshot::channel();
                self.pending = Some(tx);
                Next::Wait(rx)
            }
            None => Next::Ready(Head::End),
        }
    }

    fn deliver(&mut self, id: MessageId) {
        if let Some(tx) = self.pending.take() {
            if tx.send(Head::Message(id)).is_ok() {
                return;
            }
        }
        self.results.push_back(Slot::Id(id));
    }

    fn finish(&mut self) {
        self.processing = false;
        if let Some(tx) = self.pending.take() {
            let _ = tx.send(Head::End);
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.results.len()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| DbError::Internal(format!("mutex poisoned: {}", e)))
}

/// Stops a list when dropped, unless disarmed. Covers a caller that gives
/// up on a list before it was registered.
pub(crate) struct StopGuard {
    list: SharedList,
    armed: bool,
}

impl StopGuard {
    pub(crate) fn new(list: SharedList) -> Self {
        Self { list, armed: true }
    }

    pub(crate) fn disarm(mut self) -> SharedList {
        self.armed = false;
        self.list.clone()
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut state) = self.list.lock() {
                state.stop();
            }
        }
    }
}

/// All registered lists, by id.
#[derive(Debug)]
pub(crate) struct ListRegistry {
    next_id: AtomicU64,
    lists: Mutex<HashMap<ListId, SharedList>>,
}

impl Default for ListRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            lists: Mutex::new(HashMap::new()),
        }
    }
}

impl ListRegistry {
    pub(crate) fn register(&self, list: SharedList) -> Result<ListId> {
        let id = ListId(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.lists)?.insert(id, list);
        Ok(id)
    }

    pub(crate) fn get(&self, id: ListId) -> Result<Option<SharedList>> {
        Ok(lock(&self.lists)?.get(&id).cloned())
    }

    pub(crate) fn remove(&self, id: ListId) -> Result<Option<SharedList>> {
        Ok(lock(&self.lists)?.remove(&id))
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.lists).map_or(0, |lists| lists.len())
    }
}
