//! A naive reference model of the message database.
//!
//! The model keeps every message in a map and recomputes rollups and list
//! results by brute force. Property tests replay the same operations on a
//! database and a model and compare the two.

use std::collections::BTreeMap;

use msgstore_core::{Delivery, Message, MessageFilter, MessageId};

/// What the rollup of one thread should hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedThread {
    pub id: MessageId,
    pub timestamp: i64,
    pub body: String,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceModel {
    messages: BTreeMap<MessageId, Message>,
}

impl ReferenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, message: Message) {
        self.messages.insert(message.id, message);
    }

    pub fn remove(&mut self, id: MessageId) -> bool {
        self.messages.remove(&id).is_some()
    }

    pub fn set_read(&mut self, id: MessageId, read: bool) {
        if let Some(message) = self.messages.get_mut(&id) {
            message.read = read;
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(&id)
    }

    /// Ids of all messages, ascending.
    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The rollup every thread should have, keyed by counterpart number.
    ///
    /// The representative is the newest message; among equal timestamps the
    /// one saved last, which is the one with the greatest id.
    pub fn threads(&self) -> BTreeMap<String, ExpectedThread> {
        let mut out: BTreeMap<String, ExpectedThread> = BTreeMap::new();
        for message in self.messages.values() {
            let Some(number) = thread_number(message) else {
                continue;
            };
            let unread = u32::from(!message.read);
            let entry = out
                .entry(number.to_string())
                .or_insert_with(|| ExpectedThread {
                    id: message.id,
                    timestamp: message.timestamp,
                    body: message.body.clone(),
                    unread_count: 0,
                });
            if (message.timestamp, message.id) >= (entry.timestamp, entry.id) {
                entry.id = message.id;
                entry.timestamp = message.timestamp;
                entry.body = message.body.clone();
            }
            entry.unread_count += unread;
        }
        out
    }

    /// Ids a list for `filter` should yield, in order.
    pub fn matching(&self, filter: &MessageFilter, reverse: bool) -> Vec<MessageId> {
        let mut hits: Vec<(i64, MessageId)> = self
            .messages
            .values()
            .filter(|m| matches(filter, m))
            .map(|m| (m.timestamp, m.id))
            .collect();
        hits.sort_unstable();
        if reverse {
            hits.reverse();
        }
        hits.into_iter().map(|(_, id)| id).collect()
    }
}

/// The counterpart number of a message.
pub fn thread_number(message: &Message) -> Option<&str> {
    match message.delivery {
        Delivery::Received => message.sender.as_deref(),
        Delivery::Sending => message.receiver.as_deref(),
    }
}

fn matches(filter: &MessageFilter, message: &Message) -> bool {
    let numbers_ok = match filter.numbers.as_deref() {
        None | Some([]) => true,
        Some(numbers) => numbers.iter().any(|n| {
            message.sender.as_deref() == Some(n.as_str())
                || message.receiver.as_deref() == Some(n.as_str())
        }),
    };
    filter.in_date_range(message.timestamp)
        && filter.delivery.map_or(true, |d| d == message.delivery)
        && filter.read.map_or(true, |r| r == message.read)
        && numbers_ok
}
