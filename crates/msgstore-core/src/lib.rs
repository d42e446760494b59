//! # msgstore Core
//!
//! Pure primitives for the message store: ordered keys, message and thread
//! records, query filters, and the record codec.
//!
//! This crate contains no I/O, no storage, no runtime. It is pure computation
//! over plain data.
//!
//! ## Key Types
//!
//! - [`Key`] - An ordered index key with a memcmp-comparable byte encoding
//! - [`MessageRecord`] - One stored message, including its derived index keys
//! - [`ThreadRecord`] - The per-participant rollup (latest message + unread count)
//! - [`MessageFilter`] - The conjunction of predicates a message list is built from
//! - [`PhoneContext`] - The telephony collaborator consulted by the codec
//!
//! ## Ordering
//!
//! Keys order as `Int < Text < Array`, arrays element by element. See the
//! [`key`] module.

pub mod codec;
pub mod error;
pub mod filter;
pub mod key;
pub mod message;
pub mod phone;
pub mod thread;
pub mod types;

pub use codec::{prepare_received, prepare_sending, RawMessage};
pub use error::{CoreError, ValidationError};
pub use filter::MessageFilter;
pub use key::{Key, KeyRange};
pub use message::{
    Delivery, DeliveryStatus, Message, MessageClass, MessageKind, MessageRecord, ReadState,
};
pub use phone::{PhoneContext, StaticPhoneContext};
pub use thread::ThreadRecord;
pub use types::{ListId, MessageId};
