//! Message list filters.
//!
//! A filter is a conjunction: a message matches when it satisfies every
//! predicate that is set. The date range is inclusive at both ends.

use serde::{Deserialize, Serialize};

use crate::message::{Delivery, MessageRecord};

/// Predicates for a message list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    /// Earliest timestamp (Unix ms), inclusive.
    pub start_date: Option<i64>,
    /// Latest timestamp (Unix ms), inclusive.
    pub end_date: Option<i64>,
    pub delivery: Option<Delivery>,
    /// Match messages exchanged with any of these numbers.
    pub numbers: Option<Vec<String>>,
    pub read: Option<bool>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_date(mut self, start: i64) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn end_date(mut self, end: i64) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn numbers<I, S>(mut self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numbers = Some(numbers.into_iter().map(Into::into).collect());
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = Some(read);
        self
    }

    /// Whether `timestamp` falls inside the date range.
    pub fn in_date_range(&self, timestamp: i64) -> bool {
        self.start_date.map_or(true, |s| timestamp >= s)
            && self.end_date.map_or(true, |e| timestamp <= e)
    }

    /// Evaluate the filter directly against a record.
    ///
    /// The database answers filters from its indexes; this is the
    /// definition those index scans must agree with.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if !self.in_date_range(record.timestamp) {
            return false;
        }
        if let Some(delivery) = self.delivery {
            if record.delivery != delivery {
                return false;
            }
        }
        if let Some(read) = self.read {
            if record.is_read() != read {
                return false;
            }
        }
        // An empty list places no restriction.
        if let Some(numbers) = self.numbers.as_ref().filter(|n| !n.is_empty()) {
            let party = |n: &String| {
                record.sender.as_ref() == Some(n) || record.receiver.as_ref() == Some(n)
            };
            if !numbers.iter().any(party) {
                return false;
            }
        }
        true
    }
}
