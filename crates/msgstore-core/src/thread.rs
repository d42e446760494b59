//! Thread rollups: the most recent message and unread count per participant.
//!
//! A thread is identified by the counterpart number
//! ([`MessageRecord::thread_number`]). The rollup is a denormalized summary;
//! these methods are the pure state transitions, the database applies them
//! inside the same transaction as the message mutation.

use serde::{Deserialize, Serialize};

use crate::message::MessageRecord;
use crate::types::MessageId;

/// Key path of the primary key in the rollup store.
pub const KEY_PATH_THREAD: &str = "senderOrReceiver";

/// Rollup of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    /// The counterpart number; primary key.
    pub sender_or_receiver: String,
    /// The most recent message in the thread.
    pub id: MessageId,
    pub timestamp: i64,
    /// Body snapshot of the most recent message.
    pub body: String,
    pub unread_count: u32,
}

impl ThreadRecord {
    /// Start a thread from its first message.
    pub fn from_message(number: &str, record: &MessageRecord) -> Self {
        Self {
            sender_or_receiver: number.to_string(),
            id: record.id,
            timestamp: record.timestamp,
            body: record.body.clone(),
            unread_count: if record.is_read() { 0 } else { 1 },
        }
    }

    /// Fold a newly saved message into the rollup.
    ///
    /// The representative moves to the new message when its timestamp is
    /// greater than or equal to the current one, so on ties the latest write
    /// wins. Returns `true` if anything changed.
    pub fn apply_saved(&mut self, record: &MessageRecord) -> bool {
        let mut changed = false;
        if self.timestamp <= record.timestamp {
            self.represent(record);
            changed = true;
        }
        if !record.is_read() {
            self.unread_count += 1;
            changed = true;
        }
        changed
    }

    /// Make `record` the representative message.
    pub fn represent(&mut self, record: &MessageRecord) {
        self.id = record.id;
        self.timestamp = record.timestamp;
        self.body = record.body.clone();
    }

    /// Adjust the unread count for a message that became read (`read ==
    /// true`) or unread. Returns `false` if the count would go negative.
    pub fn apply_read_change(&mut self, read: bool) -> bool {
        if read {
            match self.unread_count.checked_sub(1) {
                Some(count) => {
                    self.unread_count = count;
                    true
                }
                None => false,
            }
        } else {
            self.unread_count += 1;
            true
        }
    }

    /// Whether `id` is the representative message.
    pub fn is_represented_by(&self, id: MessageId) -> bool {
        self.id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Delivery, DeliveryStatus, MessageClass, MessageKind, ReadState};

    fn message(id: u64, timestamp: i64, read: bool) -> MessageRecord {
        let mut record = MessageRecord {
            id: MessageId::new(id),
            kind: MessageKind::Sms,
            delivery: Delivery::Received,
            delivery_status: DeliveryStatus::Success,
            sender: Some("+1555".into()),
            receiver: None,
            body: format!("body {}", id),
            message_class: MessageClass::Normal,
            timestamp,
            read: ReadState::from_bool(read),
            delivery_index: (Delivery::Received, 0),
            number_index: vec![],
            read_index: (ReadState::Unread, 0),
        };
        record.refresh_indexes();
        record
    }

    #[test]
    fn test_first_message_starts_thread() {
        let thread = ThreadRecord::from_message("+1555", &message(1, 100, false));
        assert_eq!(thread.unread_count, 1);
        assert_eq!(thread.id, MessageId::new(1));

        let thread = ThreadRecord::from_message("+1555", &message(2, 100, true));
        assert_eq!(thread.unread_count, 0);
    }

    #[test]
    fn test_older_message_keeps_representative() {
        let mut thread = ThreadRecord::from_message("+1555", &message(1, 100, true));
        assert!(!thread.apply_saved(&message(2, 50, true)));
        assert_eq!(thread.id, MessageId::new(1));

        assert!(thread.apply_saved(&message(3, 40, false)));
        assert_eq!(thread.id, MessageId::new(1));
        assert_eq!(thread.unread_count, 1);
    }

    #[test]
    fn test_equal_timestamp_latest_write_wins() {
        let mut thread = ThreadRecord::from_message("+1555", &message(1, 100, true));
        assert!(thread.apply_saved(&message(2, 100, true)));
        assert_eq!(thread.id, MessageId::new(2));
        assert_eq!(thread.body, "body 2");
    }

    #[test]
    fn test_read_change_never_underflows() {
        let mut thread = ThreadRecord::from_message("+1555", &message(1, 100, true));
        assert!(!thread.apply_read_change(true));
        assert_eq!(thread.unread_count, 0);
        assert!(thread.apply_read_change(false));
        assert_eq!(thread.unread_count, 1);
    }
}
