//! Record codec: turn caller input into storable message records.
//!
//! Preparation validates required fields before anything touches storage,
//! resolves the device's own number, normalizes numbers, and fills the
//! derived index keys. The returned record carries
//! [`MessageId::UNASSIGNED`]; the database assigns the real id.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::message::{
    Delivery, DeliveryStatus, MessageClass, MessageKind, MessageRecord, ReadState,
};
use crate::phone::PhoneContext;
use crate::types::MessageId;

/// Caller-supplied message input. Every field is optional at this layer;
/// each preparation path checks the ones it requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    #[serde(rename = "type")]
    pub kind: Option<MessageKind>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub body: Option<String>,
    pub message_class: Option<MessageClass>,
    pub delivery_status: Option<DeliveryStatus>,
    pub timestamp: Option<i64>,
}

impl RawMessage {
    /// Input for an incoming SMS.
    pub fn received(sender: &str, body: &str, timestamp: i64) -> Self {
        Self {
            kind: Some(MessageKind::Sms),
            sender: Some(sender.to_string()),
            body: Some(body.to_string()),
            message_class: Some(MessageClass::Normal),
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    /// Input for an outgoing SMS awaiting its delivery report.
    pub fn sending(receiver: &str, body: &str, timestamp: i64) -> Self {
        Self {
            kind: Some(MessageKind::Sms),
            receiver: Some(receiver.to_string()),
            body: Some(body.to_string()),
            delivery_status: Some(DeliveryStatus::Pending),
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

fn require_number(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    let number = require(value, field)?;
    if number.is_empty() {
        return Err(ValidationError::InvalidField {
            field,
            reason: "empty number".into(),
        });
    }
    Ok(number)
}

/// Prepare an incoming message.
///
/// Requires `type`, `sender`, `messageClass` and `timestamp`. The receiver
/// is the device's own number; both numbers are normalized.
pub fn prepare_received(
    raw: RawMessage,
    phone: &dyn PhoneContext,
) -> Result<MessageRecord, ValidationError> {
    let kind = require(raw.kind, "type")?;
    let sender = require_number(raw.sender, "sender")?;
    let message_class = require(raw.message_class, "messageClass")?;
    let timestamp = require(raw.timestamp, "timestamp")?;

    let receiver = phone.own_number().map(|n| phone.to_international(&n));
    let sender = phone.to_international(&sender);

    let mut record = MessageRecord {
        id: MessageId::UNASSIGNED,
        kind,
        delivery: Delivery::Received,
        delivery_status: DeliveryStatus::Success,
        sender: Some(sender),
        receiver,
        body: raw.body.unwrap_or_default(),
        message_class,
        timestamp,
        read: ReadState::Unread,
        delivery_index: (Delivery::Received, timestamp),
        number_index: Vec::new(),
        read_index: (ReadState::Unread, timestamp),
    };
    record.refresh_indexes();
    Ok(record)
}

/// Prepare an outgoing message.
///
/// Requires `type`, `receiver`, `deliveryStatus` and `timestamp`. The sender
/// is the device's own number. Numbers are normalized only on the home
/// network; while roaming they are stored as given.
pub fn prepare_sending(
    raw: RawMessage,
    phone: &dyn PhoneContext,
) -> Result<MessageRecord, ValidationError> {
    let kind = require(raw.kind, "type")?;
    let receiver = require_number(raw.receiver, "receiver")?;
    let delivery_status = require(raw.delivery_status, "deliveryStatus")?;
    let timestamp = require(raw.timestamp, "timestamp")?;

    let mut sender = phone.own_number();
    let mut receiver = receiver;
    if phone.is_home_network() {
        sender = sender.map(|n| phone.to_international(&n));
        receiver = phone.to_international(&receiver);
    }

    let mut record = MessageRecord {
        id: MessageId::UNASSIGNED,
        kind,
        delivery: Delivery::Sending,
        delivery_status,
        sender,
        receiver: Some(receiver),
        body: raw.body.unwrap_or_default(),
        message_class: MessageClass::Normal,
        timestamp,
        read: ReadState::Read,
        delivery_index: (Delivery::Sending, timestamp),
        number_index: Vec::new(),
        read_index: (ReadState::Read, timestamp),
    };
    record.refresh_indexes();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::phone::StaticPhoneContext;

    fn phone() -> StaticPhoneContext {
        StaticPhoneContext::new(Some("5550000")).with_country_code("1")
    }

    #[test]
    fn test_received_fills_receiver_and_normalizes() {
        let record = prepare_received(RawMessage::received("5551234", "hi", 100), &phone()).unwrap();
        assert_eq!(record.sender.as_deref(), Some("+15551234"));
        assert_eq!(record.receiver.as_deref(), Some("+15550000"));
        assert_eq!(record.delivery, Delivery::Received);
        assert_eq!(record.delivery_status, DeliveryStatus::Success);
        assert!(!record.is_read());
        assert!(!record.id.is_assigned());
        assert_eq!(record.delivery_key(), Key::pair("received", 100));
        assert_eq!(record.read_key(), Key::pair(0, 100));
        assert_eq!(record.number_keys().len(), 2);
    }

    #[test]
    fn test_received_missing_fields() {
        let mut raw = RawMessage::received("+1", "hi", 1);
        raw.message_class = None;
        assert_eq!(
            prepare_received(raw, &phone()),
            Err(ValidationError::MissingField("messageClass"))
        );

        let mut raw = RawMessage::received("+1", "hi", 1);
        raw.timestamp = None;
        assert_eq!(
            prepare_received(raw, &phone()),
            Err(ValidationError::MissingField("timestamp"))
        );

        let mut raw = RawMessage::received("+1", "hi", 1);
        raw.kind = None;
        assert_eq!(
            prepare_received(raw, &phone()),
            Err(ValidationError::MissingField("type"))
        );
    }

    #[test]
    fn test_received_with_unknown_own_number() {
        let phone = StaticPhoneContext::new(Some("undefined"));
        let record = prepare_received(RawMessage::received("+1", "", 1), &phone).unwrap();
        assert_eq!(record.receiver, None);
        assert_eq!(record.number_keys(), vec![Key::pair("+1", 1)]);
    }

    #[test]
    fn test_sending_is_read_and_normal() {
        let record = prepare_sending(RawMessage::sending("5551234", "yo", 7), &phone()).unwrap();
        assert_eq!(record.delivery, Delivery::Sending);
        assert_eq!(record.delivery_status, DeliveryStatus::Pending);
        assert_eq!(record.message_class, MessageClass::Normal);
        assert!(record.is_read());
        assert_eq!(record.sender.as_deref(), Some("+15550000"));
        assert_eq!(record.receiver.as_deref(), Some("+15551234"));
        assert_eq!(record.thread_number(), Some("+15551234"));
    }

    #[test]
    fn test_sending_roaming_keeps_numbers() {
        let phone = phone().with_home_network(false);
        let record = prepare_sending(RawMessage::sending("5551234", "yo", 7), &phone).unwrap();
        assert_eq!(record.sender.as_deref(), Some("5550000"));
        assert_eq!(record.receiver.as_deref(), Some("5551234"));
    }

    #[test]
    fn test_sending_requires_delivery_status() {
        let mut raw = RawMessage::sending("+1", "", 1);
        raw.delivery_status = None;
        assert_eq!(
            prepare_sending(raw, &phone()),
            Err(ValidationError::MissingField("deliveryStatus"))
        );
        let mut raw = RawMessage::sending("", "", 1);
        raw.receiver = Some(String::new());
        assert!(matches!(
            prepare_sending(raw, &phone()),
            Err(ValidationError::InvalidField { field: "receiver", .. })
        ));
    }

    #[test]
    fn test_raw_from_json() {
        let raw: RawMessage = serde_json::from_str(
            r#"{"type":"sms","sender":"+1","messageClass":"class-0","timestamp":5}"#,
        )
        .unwrap();
        assert_eq!(raw.message_class, Some(MessageClass::Class0));
        let record = prepare_received(raw, &phone()).unwrap();
        assert_eq!(record.body, "");
    }
}
