//! Proptest generators for property-based testing.
//!
//! Numbers come from a small pool and timestamps from a narrow range, so
//! generated histories share threads and collide on timestamps often.

use proptest::prelude::*;

use msgstore_core::{Delivery, MessageFilter, RawMessage};

use crate::fixtures::OWN_NUMBER;

/// Counterpart numbers used by generated messages.
pub const NUMBERS: [&str; 4] = ["+1001", "+1002", "+1003", OWN_NUMBER];

/// Generate a number from the pool.
pub fn number() -> impl Strategy<Value = String> {
    prop::sample::select(&NUMBERS[..]).prop_map(String::from)
}

/// Generate a timestamp in a narrow range.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..40
}

pub fn body() -> impl Strategy<Value = String> {
    "[a-z ]{0,12}".prop_map(String::from)
}

/// Generate valid incoming input.
pub fn raw_received() -> impl Strategy<Value = RawMessage> {
    (number(), body(), timestamp()).prop_map(|(n, b, ts)| RawMessage::received(&n, &b, ts))
}

/// Generate valid outgoing input.
pub fn raw_sending() -> impl Strategy<Value = RawMessage> {
    (number(), body(), timestamp()).prop_map(|(n, b, ts)| RawMessage::sending(&n, &b, ts))
}

/// One mutation of a message history.
///
/// `Delete` and `MarkRead` pick an existing message by index modulo the
/// number of messages saved so far; with none saved they are skipped.
#[derive(Debug, Clone)]
pub enum Op {
    Receive(RawMessage),
    Send(RawMessage),
    Delete(usize),
    MarkRead(usize, bool),
}

pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => raw_received().prop_map(Op::Receive),
        2 => raw_sending().prop_map(Op::Send),
        1 => any::<usize>().prop_map(Op::Delete),
        2 => (any::<usize>(), any::<bool>()).prop_map(|(i, read)| Op::MarkRead(i, read)),
    ]
}

/// Generate a sequence of up to `max` operations.
pub fn ops(max: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op(), 0..=max)
}

pub fn delivery() -> impl Strategy<Value = Delivery> {
    prop_oneof![Just(Delivery::Received), Just(Delivery::Sending)]
}

/// Generate a filter over any combination of predicates.
pub fn filter() -> impl Strategy<Value = MessageFilter> {
    (
        proptest::option::of(timestamp()),
        proptest::option::of(timestamp()),
        proptest::option::of(delivery()),
        proptest::option::of(prop::sample::subsequence(&NUMBERS[..], 0..=3)),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(start, end, delivery, numbers, read)| MessageFilter {
            start_date: start,
            end_date: end,
            delivery,
            numbers: numbers.map(|n| n.into_iter().map(String::from).collect()),
            read,
        })
}
