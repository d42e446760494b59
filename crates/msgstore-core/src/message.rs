//! Message records: one stored SMS, plus its derived index keys.
//!
//! Field names serialize in camelCase and enum values in kebab-case; the
//! store's index key paths (`deliveryIndex`, `numberIndex`, `readIndex`,
//! `timestamp`) refer to these serialized names.

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::types::MessageId;

/// Key path of the primary key in the message store.
pub const KEY_PATH_ID: &str = "id";
/// Key path of the plain timestamp index.
pub const KEY_PATH_TIMESTAMP: &str = "timestamp";
/// Key path of the composite `(delivery, timestamp)` index.
pub const KEY_PATH_DELIVERY: &str = "deliveryIndex";
/// Key path of the multi-entry `(number, timestamp)` index.
pub const KEY_PATH_NUMBER: &str = "numberIndex";
/// Key path of the composite `(read, timestamp)` index.
pub const KEY_PATH_READ: &str = "readIndex";

/// Message transport type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Sms,
    Mms,
}

/// Direction of a message relative to this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    Sending,
    Received,
}

impl Delivery {
    pub fn as_str(self) -> &'static str {
        match self {
            Delivery::Sending => "sending",
            Delivery::Received => "received",
        }
    }
}

/// Delivery report state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    NotApplicable,
    Success,
    Pending,
    Error,
}

/// GSM message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageClass {
    #[default]
    Normal,
    #[serde(rename = "class-0")]
    Class0,
    #[serde(rename = "class-1")]
    Class1,
    #[serde(rename = "class-2")]
    Class2,
    #[serde(rename = "class-3")]
    Class3,
}

/// Read flag, stored as an integer so it can be part of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReadState {
    Unread = 0,
    Read = 1,
}

impl ReadState {
    pub fn from_bool(read: bool) -> Self {
        if read {
            ReadState::Read
        } else {
            ReadState::Unread
        }
    }

    pub fn is_read(self) -> bool {
        self == ReadState::Read
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl From<ReadState> for u8 {
    fn from(state: ReadState) -> Self {
        state.to_u8()
    }
}

impl TryFrom<u8> for ReadState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadState::Unread),
            1 => Ok(ReadState::Read),
            other => Err(format!("invalid read state {}", other)),
        }
    }
}

/// One stored message.
///
/// The three `*_index` fields are derived from the others and must be
/// recomputed with [`MessageRecord::refresh_indexes`] after any change to
/// `delivery`, `sender`, `receiver`, `read`, or `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub delivery: Delivery,
    pub delivery_status: DeliveryStatus,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub body: String,
    pub message_class: MessageClass,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub read: ReadState,
    pub delivery_index: (Delivery, i64),
    /// One entry per party; an absent number yields no index entry.
    pub number_index: Vec<(Option<String>, i64)>,
    pub read_index: (ReadState, i64),
}

impl MessageRecord {
    /// Recompute the derived index keys from the record's fields.
    pub fn refresh_indexes(&mut self) {
        let ts = self.timestamp;
        self.delivery_index = (self.delivery, ts);
        self.number_index = vec![(self.sender.clone(), ts), (self.receiver.clone(), ts)];
        self.read_index = (self.read, ts);
    }

    /// The counterpart number: the sender of a received message, the
    /// receiver of a sent one. Threads are keyed by it.
    pub fn thread_number(&self) -> Option<&str> {
        match self.delivery {
            Delivery::Received => self.sender.as_deref(),
            Delivery::Sending => self.receiver.as_deref(),
        }
    }

    pub fn is_read(&self) -> bool {
        self.read.is_read()
    }

    /// Set the read flag. Returns `true` if the value changed.
    pub fn set_read(&mut self, read: bool) -> bool {
        let state = ReadState::from_bool(read);
        if self.read == state {
            return false;
        }
        self.read = state;
        self.read_index = (state, self.timestamp);
        true
    }

    /// Set delivery and its status. Returns `true` if either changed.
    pub fn set_delivery(&mut self, delivery: Delivery, status: DeliveryStatus) -> bool {
        if self.delivery == delivery && self.delivery_status == status {
            return false;
        }
        self.delivery = delivery;
        self.delivery_status = status;
        self.delivery_index = (delivery, self.timestamp);
        true
    }

    /// Composite key of this record in the `delivery` index.
    pub fn delivery_key(&self) -> Key {
        Key::pair(self.delivery.as_str(), self.timestamp)
    }

    /// Composite keys of this record in the multi-entry `number` index.
    pub fn number_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = [&self.sender, &self.receiver]
            .into_iter()
            .flatten()
            .map(|n| Key::pair(n.as_str(), self.timestamp))
            .collect();
        keys.dedup();
        keys
    }

    /// Composite key of this record in the `read` index.
    pub fn read_key(&self) -> Key {
        Key::pair(self.read.to_u8() as i64, self.timestamp)
    }
}

/// The caller-facing view of a message, without the derived index keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub delivery: Delivery,
    pub delivery_status: DeliveryStatus,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub body: String,
    pub message_class: MessageClass,
    pub timestamp: i64,
    pub read: bool,
}

impl From<&MessageRecord> for Message {
    fn from(record: &MessageRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            delivery: record.delivery,
            delivery_status: record.delivery_status,
            sender: record.sender.clone(),
            receiver: record.receiver.clone(),
            body: record.body.clone(),
            message_class: record.message_class,
            timestamp: record.timestamp,
            read: record.is_read(),
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message::from(&record)
    }
}
