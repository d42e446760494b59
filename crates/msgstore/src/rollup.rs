//! Thread rollup maintenance.
//!
//! Each function runs inside the write transaction of the message mutation
//! that triggered it, so a message change and its rollup change commit
//! together.

use msgstore_core::{Key, KeyRange, MessageId, MessageRecord, ThreadRecord};
use msgstore_store::{Direction, IndexEntry, Transaction};
use tracing::{debug, warn};

use crate::error::Result;
use crate::schema::{INDEX_NUMBER, STORE_MESSAGES, STORE_THREADS};

/// Entries fetched per page while looking for a new representative.
const RESCAN_PAGE: usize = 16;

/// Fold a newly saved message into its thread.
pub(crate) fn on_save(txn: &mut Transaction<'_>, record: &MessageRecord) -> Result<()> {
    let Some(number) = record.thread_number() else {
        warn!(id = %record.id, "saved message has no counterpart number");
        return Ok(());
    };
    let key = Key::from(number);
    match txn.get::<ThreadRecord>(STORE_THREADS, &key)? {
        None => {
            txn.put(STORE_THREADS, &ThreadRecord::from_message(number, record))?;
            debug!(number, id = %record.id, "created thread");
        }
        Some(mut thread) => {
            if thread.apply_saved(record) {
                txn.put(STORE_THREADS, &thread)?;
            }
        }
    }
    Ok(())
}

/// Update the thread of a message that was just deleted.
///
/// If the deleted message was the representative, the newest remaining
/// message of the thread takes its place; if none remains the rollup is
/// removed.
pub(crate) fn on_delete(txn: &mut Transaction<'_>, record: &MessageRecord) -> Result<()> {
    let Some(number) = record.thread_number() else {
        return Ok(());
    };
    let key = Key::from(number);
    let Some(mut thread) = txn.get::<ThreadRecord>(STORE_THREADS, &key)? else {
        warn!(number, id = %record.id, "deleted message has no thread");
        return Ok(());
    };

    let mut changed = false;
    if !record.is_read() {
        if thread.apply_read_change(true) {
            changed = true;
        } else {
            warn!(number, "thread unread count already zero");
        }
    }

    if thread.is_represented_by(record.id) {
        match newest_in_thread(txn, number)? {
            Some(newest) => {
                thread.represent(&newest);
                changed = true;
            }
            None => {
                txn.delete(STORE_THREADS, &key)?;
                debug!(number, "removed empty thread");
                return Ok(());
            }
        }
    }

    if changed {
        txn.put(STORE_THREADS, &thread)?;
    }
    Ok(())
}

/// Adjust the unread count after a message's read flag flipped to `read`.
pub(crate) fn on_read_change(
    txn: &mut Transaction<'_>,
    record: &MessageRecord,
    read: bool,
) -> Result<()> {
    let Some(number) = record.thread_number() else {
        return Ok(());
    };
    let Some(mut thread) = txn.get::<ThreadRecord>(STORE_THREADS, &Key::from(number))? else {
        warn!(number, id = %record.id, "read change on message without thread");
        return Ok(());
    };
    if thread.apply_read_change(read) {
        txn.put(STORE_THREADS, &thread)?;
    } else {
        warn!(number, id = %record.id, "thread unread count already zero");
    }
    Ok(())
}

/// The newest remaining message whose counterpart is `number`.
///
/// The number index also lists messages where `number` is our own side, so
/// entries are filtered by counterpart.
fn newest_in_thread(txn: &Transaction<'_>, number: &str) -> Result<Option<MessageRecord>> {
    let range = KeyRange::bound(Key::pair(number, i64::MIN), Key::pair(number, i64::MAX));
    let mut after: Option<IndexEntry> = None;
    loop {
        let page = txn.scan_index(
            STORE_MESSAGES,
            INDEX_NUMBER,
            &range,
            Direction::Prev,
            after.as_ref(),
            Some(RESCAN_PAGE),
        )?;
        for entry in &page {
            let Some(id) = MessageId::from_key(&entry.primary_key) else {
                continue;
            };
            let Some(record) = txn.get::<MessageRecord>(STORE_MESSAGES, &id.to_key())? else {
                warn!(id = %id, "number index points at missing message");
                continue;
            };
            if record.thread_number() == Some(number) {
                return Ok(Some(record));
            }
        }
        if page.len() < RESCAN_PAGE {
            return Ok(None);
        }
        after = page.last().cloned();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use msgstore_core::{prepare_received, prepare_sending, RawMessage, StaticPhoneContext};
    use msgstore_store::{Database, MemoryBackend};

    use super::*;
    use crate::migration::migrate;
    use crate::schema::{CURRENT_VERSION, MESSAGES_AND_THREADS};

    const OWN: &str = "+15550000";

    fn db() -> Database<MemoryBackend> {
        Database::open(Arc::new(MemoryBackend::new()), CURRENT_VERSION, migrate).unwrap()
    }

    fn received(id: u64, from: &str, ts: i64) -> MessageRecord {
        let phone = StaticPhoneContext::new(Some(OWN));
        let mut record = prepare_received(RawMessage::received(from, "hi", ts), &phone).unwrap();
        record.id = MessageId::new(id);
        record
    }

    fn sent(id: u64, to: &str, ts: i64) -> MessageRecord {
        let phone = StaticPhoneContext::new(Some(OWN));
        let mut record = prepare_sending(RawMessage::sending(to, "yo", ts), &phone).unwrap();
        record.id = MessageId::new(id);
        record
    }

    fn save(db: &Database<MemoryBackend>, record: &MessageRecord) {
        db.write(MESSAGES_AND_THREADS, |txn| {
            txn.put(STORE_MESSAGES, record)?;
            on_save(txn, record)
        })
        .unwrap();
    }

    fn delete(db: &Database<MemoryBackend>, record: &MessageRecord) {
        db.write(MESSAGES_AND_THREADS, |txn| {
            txn.delete(STORE_MESSAGES, &record.id.to_key())?;
            on_delete(txn, record)
        })
        .unwrap();
    }

    fn thread(db: &Database<MemoryBackend>, number: &str) -> Option<ThreadRecord> {
        db.read(MESSAGES_AND_THREADS, |txn| txn.get(STORE_THREADS, &Key::from(number)))
            .unwrap()
    }

    #[test]
    fn test_save_creates_then_updates() {
        let db = db();
        save(&db, &received(1, "+1", 100));
        let t = thread(&db, "+1").unwrap();
        assert_eq!((t.id, t.unread_count), (MessageId::new(1), 1));

        save(&db, &sent(2, "+1", 50));
        let t = thread(&db, "+1").unwrap();
        assert_eq!((t.id, t.unread_count), (MessageId::new(1), 1));

        save(&db, &received(3, "+1", 100));
        let t = thread(&db, "+1").unwrap();
        assert_eq!((t.id, t.timestamp, t.unread_count), (MessageId::new(3), 100, 2));
    }

    #[test]
    fn test_deleting_representative_rescans_thread() {
        let db = db();
        let a = received(1, "+1", 10);
        let b = sent(2, "+1", 20);
        let c = received(3, "+1", 30);
        // Another thread where "+1" never is the counterpart.
        let other = received(4, "+2", 40);
        for r in [&a, &b, &c, &other] {
            save(&db, r);
        }

        delete(&db, &c);
        let t = thread(&db, "+1").unwrap();
        assert_eq!((t.id, t.timestamp, t.unread_count), (MessageId::new(2), 20, 1));

        delete(&db, &a);
        let t = thread(&db, "+1").unwrap();
        assert_eq!((t.id, t.unread_count), (MessageId::new(2), 0));

        delete(&db, &b);
        assert!(thread(&db, "+1").is_none());
        assert!(thread(&db, "+2").is_some());
    }

    #[test]
    fn test_rescan_skips_messages_from_own_side() {
        let db = db();
        // A message sent to ourselves lists OWN in the number index under
        // both parties; its counterpart is OWN too.
        let to_self = sent(1, OWN, 5);
        let from_other = received(2, "+9", 50);
        let keep = sent(3, OWN, 10);
        for r in [&to_self, &from_other, &keep] {
            save(&db, r);
        }
        delete(&db, &keep);
        let t = thread(&db, OWN).unwrap();
        assert_eq!(t.id, MessageId::new(1));
    }

    #[test]
    fn test_read_change_adjusts_count() {
        let db = db();
        let mut record = received(1, "+1", 10);
        save(&db, &record);
        record.set_read(true);
        db.write(MESSAGES_AND_THREADS, |txn| on_read_change(txn, &record, true))
            .unwrap();
        assert_eq!(thread(&db, "+1").unwrap().unread_count, 0);

        // Already zero: logged and left alone.
        db.write(MESSAGES_AND_THREADS, |txn| on_read_change(txn, &record, true))
            .unwrap();
        assert_eq!(thread(&db, "+1").unwrap().unread_count, 0);

        db.write(MESSAGES_AND_THREADS, |txn| on_read_change(txn, &record, false))
            .unwrap();
        assert_eq!(thread(&db, "+1").unwrap().unread_count, 1);
    }
}
