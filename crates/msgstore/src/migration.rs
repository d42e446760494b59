//! Logical schema migrations.
//!
//! Each step upgrades the stores from version `n - 1` to `n` inside the
//! single upgrade transaction opened by [`msgstore_store::Database::open`].
//! Steps run in order and only as part of one forward pass.
//!
//! Records written before version 7 lack the composite index keys and may
//! carry the read flag as a boolean. They are read through
//! [`LegacyMessage`].

use std::collections::BTreeMap;

use msgstore_core::message::{
    KEY_PATH_DELIVERY, KEY_PATH_ID, KEY_PATH_NUMBER, KEY_PATH_READ, KEY_PATH_TIMESTAMP,
};
use msgstore_core::thread::KEY_PATH_THREAD;
use msgstore_core::{
    Delivery, DeliveryStatus, MessageClass, MessageId, MessageKind, MessageRecord, ReadState,
    ThreadRecord,
};
use msgstore_store::Transaction;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DbError, Result};
use crate::schema::{
    INDEX_DELIVERY, INDEX_NUMBER, INDEX_READ, INDEX_TIMESTAMP, STORE_MESSAGES, STORE_THREADS,
};

/// Indexes of the pre-composite layout, dropped by the step to version 7.
const LEGACY_INDEXES: [&str; 4] = ["delivery", "sender", "receiver", "read"];

/// Upgrade the stores from `old` to `new`, one version at a time.
pub fn migrate(txn: &mut Transaction<'_>, old: u32, new: u32) -> Result<()> {
    for version in (old + 1)..=new {
        apply_step(txn, version)?;
        info!(version, "applied schema upgrade step");
    }
    Ok(())
}

fn apply_step(txn: &mut Transaction<'_>, version: u32) -> Result<()> {
    match version {
        1 => upgrade_v1(txn),
        2 => upgrade_v2(txn),
        3 => upgrade_v3(txn),
        4 => upgrade_v4(txn),
        5 => upgrade_v5(txn),
        6 => Ok(()),
        7 => upgrade_v7(txn),
        _ => Err(DbError::Internal(format!(
            "no schema upgrade step to version {}",
            version
        ))),
    }
}

/// v1: the message store with a timestamp index.
fn upgrade_v1(txn: &mut Transaction<'_>) -> Result<()> {
    txn.create_store(STORE_MESSAGES, KEY_PATH_ID)?;
    txn.create_index(STORE_MESSAGES, INDEX_TIMESTAMP, KEY_PATH_TIMESTAMP, false)?;
    Ok(())
}

/// v2: a plain index on the read flag.
fn upgrade_v2(txn: &mut Transaction<'_>) -> Result<()> {
    txn.create_index(STORE_MESSAGES, "read", "read", false)?;
    Ok(())
}

/// v3: every existing record gets the default class and delivery status.
fn upgrade_v3(txn: &mut Transaction<'_>) -> Result<()> {
    let records: Vec<(_, LegacyMessage)> = txn.scan_all(STORE_MESSAGES)?;
    let count = records.len();
    for (_, mut message) in records {
        message.message_class = Some(MessageClass::Normal);
        message.delivery_status = Some(DeliveryStatus::NotApplicable);
        txn.put(STORE_MESSAGES, &message)?;
    }
    debug!(count, "back-filled message class and delivery status");
    Ok(())
}

/// v4: the thread rollup store.
fn upgrade_v4(txn: &mut Transaction<'_>) -> Result<()> {
    if txn.has_index(STORE_MESSAGES, "id") {
        txn.delete_index(STORE_MESSAGES, "id")?;
    }
    txn.create_store(STORE_THREADS, KEY_PATH_THREAD)?;
    txn.create_index(STORE_THREADS, INDEX_TIMESTAMP, KEY_PATH_TIMESTAMP, false)?;
    Ok(())
}

/// v5: fill the rollup store from every stored message.
fn upgrade_v5(txn: &mut Transaction<'_>) -> Result<()> {
    let records: Vec<(_, LegacyMessage)> = txn.scan_all(STORE_MESSAGES)?;
    let mut threads: BTreeMap<String, ThreadRecord> = BTreeMap::new();
    for (_, message) in records {
        let record = message.into_record();
        let Some(number) = record.thread_number() else {
            continue;
        };
        match threads.get_mut(number) {
            Some(thread) => {
                thread.apply_saved(&record);
            }
            None => {
                threads.insert(number.to_string(), ThreadRecord::from_message(number, &record));
            }
        }
    }
    debug!(threads = threads.len(), "built thread rollups");
    for thread in threads.values() {
        txn.put(STORE_THREADS, thread)?;
    }
    Ok(())
}

/// v7: composite `delivery`, `number` and `read` indexes replace the
/// single-attribute ones.
fn upgrade_v7(txn: &mut Transaction<'_>) -> Result<()> {
    for index in LEGACY_INDEXES {
        if txn.has_index(STORE_MESSAGES, index) {
            txn.delete_index(STORE_MESSAGES, index)?;
        }
    }

    let records: Vec<(_, LegacyMessage)> = txn.scan_all(STORE_MESSAGES)?;
    let count = records.len();
    for (_, message) in records {
        txn.put(STORE_MESSAGES, &message.into_record())?;
    }

    txn.create_index(STORE_MESSAGES, INDEX_DELIVERY, KEY_PATH_DELIVERY, false)?;
    txn.create_index(STORE_MESSAGES, INDEX_NUMBER, KEY_PATH_NUMBER, true)?;
    txn.create_index(STORE_MESSAGES, INDEX_READ, KEY_PATH_READ, false)?;
    debug!(count, "back-filled composite index keys");
    Ok(())
}

/// A message as stored before version 7.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMessage {
    pub id: MessageId,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: MessageKind,
    pub delivery: Delivery,
    #[serde(default)]
    pub delivery_status: Option<DeliveryStatus>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub message_class: Option<MessageClass>,
    pub timestamp: i64,
    pub read: LegacyRead,
}

/// The read flag was a boolean before it became part of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyRead {
    Flag(bool),
    State(u8),
}

impl LegacyRead {
    pub fn is_read(self) -> bool {
        match self {
            LegacyRead::Flag(read) => read,
            LegacyRead::State(state) => state != 0,
        }
    }
}

fn default_kind() -> MessageKind {
    MessageKind::Sms
}

impl LegacyMessage {
    /// Convert to the current record shape, filling the index keys.
    pub fn into_record(self) -> MessageRecord {
        let mut record = MessageRecord {
            id: self.id,
            kind: self.kind,
            delivery: self.delivery,
            delivery_status: self.delivery_status.unwrap_or(DeliveryStatus::NotApplicable),
            sender: self.sender,
            receiver: self.receiver,
            body: self.body,
            message_class: self.message_class.unwrap_or_default(),
            timestamp: self.timestamp,
            read: ReadState::from_bool(self.read.is_read()),
            delivery_index: (self.delivery, self.timestamp),
            number_index: Vec::new(),
            read_index: (ReadState::Unread, self.timestamp),
        };
        record.refresh_indexes();
        record
    }
}
