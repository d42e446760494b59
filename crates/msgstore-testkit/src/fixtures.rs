//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use msgstore::{DatabaseConfig, ListCreation, MessageDatabase, Result};
use msgstore_core::{Message, MessageFilter, MessageId, RawMessage, StaticPhoneContext};
use msgstore_store::MemoryBackend;

/// The device's own number in every fixture.
pub const OWN_NUMBER: &str = "+15550000";

/// A memory-backed database with a fixed telephony context.
pub struct TestFixture {
    pub backend: Arc<MemoryBackend>,
    pub db: MessageDatabase<MemoryBackend>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    /// Use small cursor pages to exercise paging.
    pub fn with_batch_size(size: usize) -> Self {
        Self::with_config(DatabaseConfig::default().with_scan_batch_size(size))
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Self::on_backend(Arc::new(MemoryBackend::new()), config)
    }

    /// A fixture over an existing backend, e.g. one prepared at an older
    /// layout.
    pub fn on_backend(backend: Arc<MemoryBackend>, config: DatabaseConfig) -> Self {
        let db = MessageDatabase::with_shared_backend(backend.clone(), phone(), config);
        Self { backend, db }
    }

    /// Reopen the same data through a fresh database handle.
    pub fn reopen(&self) -> Self {
        Self::on_backend(self.backend.clone(), self.db.config().clone())
    }

    pub async fn receive(&self, from: &str, body: &str, timestamp: i64) -> Result<MessageId> {
        self.db
            .save_received(RawMessage::received(from, body, timestamp))
            .await
    }

    pub async fn send(&self, to: &str, body: &str, timestamp: i64) -> Result<MessageId> {
        self.db
            .save_sending(RawMessage::sending(to, body, timestamp))
            .await
    }

    /// Run a query to its end and return every message, clearing the list
    /// afterwards.
    pub async fn collect(&self, filter: MessageFilter, reverse: bool) -> Result<Vec<Message>> {
        let (list_id, first) = match self.db.create_message_list(filter, reverse).await? {
            ListCreation::Created { list_id, first } => (list_id, first),
            ListCreation::Empty => return Ok(Vec::new()),
        };
        let mut out = vec![first];
        while let Some(message) = self.db.get_next_message_in_list(list_id).await? {
            out.push(message);
        }
        self.db.clear_message_list(list_id)?;
        Ok(out)
    }

    pub async fn collect_ids(&self, filter: MessageFilter, reverse: bool) -> Result<Vec<MessageId>> {
        let messages = self.collect(filter, reverse).await?;
        Ok(messages.into_iter().map(|m| m.id).collect())
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The telephony context used by fixtures.
pub fn phone() -> Arc<StaticPhoneContext> {
    Arc::new(StaticPhoneContext::new(Some(OWN_NUMBER)))
}

/// Parse caller input given as JSON.
pub fn raw_from_json(json: &str) -> serde_json::Result<RawMessage> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use msgstore_core::{Delivery, MessageKind};

    use super::*;

    #[tokio::test]
    async fn test_fixture_round_trip() {
        let fixture = TestFixture::new();
        let a = fixture.receive("+1", "one", 10).await.unwrap();
        let b = fixture.send("+2", "two", 20).await.unwrap();

        let all = fixture.collect_ids(MessageFilter::new(), true).await.unwrap();
        assert_eq!(all, vec![b, a]);
        assert_eq!(fixture.db.stats().open_lists, 0);
    }

    #[tokio::test]
    async fn test_reopen_sees_same_data() {
        let fixture = TestFixture::with_batch_size(1);
        let id = fixture.receive("+1", "kept", 10).await.unwrap();
        let reopened = fixture.reopen();
        let message = reopened.db.get_message(id).await.unwrap();
        assert_eq!(message.body, "kept");
        assert_eq!(message.delivery, Delivery::Received);
        // The counter is seeded from the stored ids.
        assert!(reopened.receive("+1", "next", 11).await.unwrap() > id);
    }

    #[test]
    fn test_raw_from_json() {
        let raw = raw_from_json(
            r#"{"type":"sms","sender":"+1","body":"hi","messageClass":"normal","timestamp":5}"#,
        )
        .unwrap();
        assert_eq!(raw.kind, Some(MessageKind::Sms));
        assert_eq!(raw.timestamp, Some(5));
        assert!(raw.receiver.is_none());
    }
}
