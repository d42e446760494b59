//! Index cursors feeding a message list.
//!
//! One task per stream. Each page is read in its own short transaction and
//! handed to the list under its lock; the lock is never held across an
//! await. A cursor stops as soon as the list no longer wants its stream.

use std::sync::Arc;

use msgstore_core::MessageId;
use msgstore_store::{Direction, IndexEntry, KvBackend};
use tracing::{debug, warn};

use super::plan::{entry_timestamp, SourceId, StreamSpec};
use crate::gateway::Gateway;
use crate::list::{lock, SharedList};
use crate::schema::{MESSAGES, STORE_MESSAGES};

pub(crate) async fn run<B: KvBackend>(
    gateway: Arc<Gateway<B>>,
    list: SharedList,
    source: SourceId,
    spec: StreamSpec,
    direction: Direction,
    batch: usize,
) {
    let mut after: Option<IndexEntry> = None;
    let mut pages = 0usize;
    loop {
        if !lock(&list).map_or(false, |state| state.wants(source)) {
            debug!(?source, pages, "cursor released");
            return;
        }

        let page_spec = spec.clone();
        let resume = after.clone();
        let page = gateway
            .read(MESSAGES, move |txn| {
                Ok(txn.scan_index(
                    STORE_MESSAGES,
                    page_spec.index,
                    &page_spec.range,
                    direction,
                    resume.as_ref(),
                    Some(batch),
                )?)
            })
            .await;
        pages += 1;

        let Ok(mut state) = lock(&list) else {
            warn!(?source, "list lock poisoned");
            return;
        };
        let entries = match page {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?source, index = spec.index, error = %e, "cursor failed");
                state.fail(e.to_string());
                return;
            }
        };

        for entry in &entries {
            let (Some(id), Some(ts)) = (
                MessageId::from_key(&entry.primary_key),
                entry_timestamp(&entry.key),
            ) else {
                warn!(index = spec.index, key = %entry.key, "malformed index entry");
                continue;
            };
            if !state.on_entry(source, id, ts) {
                debug!(?source, pages, "cursor released");
                return;
            }
        }

        if entries.len() < batch {
            state.on_done(source);
            debug!(?source, pages, "cursor exhausted");
            return;
        }
        after = entries.last().cloned();
    }
}
