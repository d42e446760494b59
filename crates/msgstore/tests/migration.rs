//! Upgrading an older on-disk layout through the public database API.

use std::sync::Arc;

use msgstore::core::{Delivery, MessageKind, MessageRecord};
use msgstore::migration::{migrate, LegacyMessage, LegacyRead};
use msgstore::schema::{CURRENT_VERSION, INDEX_DELIVERY, INDEX_NUMBER, INDEX_READ, STORE_MESSAGES};
use msgstore::store::{Database, MemoryBackend, StoreError};
use msgstore::{DatabaseConfig, DbError, MessageFilter, MessageId};
use msgstore_testkit::TestFixture;

fn legacy(id: u64, delivery: Delivery, number: &str, ts: i64, read: bool) -> LegacyMessage {
    let (sender, receiver) = match delivery {
        Delivery::Received => (Some(number.to_string()), Some("+15550000".to_string())),
        Delivery::Sending => (Some("+15550000".to_string()), Some(number.to_string())),
    };
    LegacyMessage {
        id: MessageId::new(id),
        kind: MessageKind::Sms,
        delivery,
        delivery_status: None,
        sender,
        receiver,
        body: format!("legacy {}", id),
        message_class: None,
        timestamp: ts,
        read: LegacyRead::Flag(read),
    }
}

/// A backend holding a version 3 layout with a few messages.
fn version_3_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    let db = Database::open(backend.clone(), 3, migrate).unwrap();
    db.write(&[STORE_MESSAGES], |txn| -> Result<(), DbError> {
        txn.put(STORE_MESSAGES, &legacy(1, Delivery::Received, "+1001", 10, false))?;
        txn.put(STORE_MESSAGES, &legacy(2, Delivery::Sending, "+1001", 20, true))?;
        txn.put(STORE_MESSAGES, &legacy(3, Delivery::Received, "+1002", 15, false))?;
        Ok(())
    })
    .unwrap();
    backend
}

#[tokio::test]
async fn test_version_3_upgrades_to_current() {
    let backend = version_3_backend();
    let fixture = TestFixture::on_backend(backend.clone(), DatabaseConfig::default());
    fixture.db.open().await.unwrap();

    let db = Database::open(backend, CURRENT_VERSION, migrate).unwrap();
    assert_eq!(db.version(), CURRENT_VERSION);
    let indexes: Vec<_> = db
        .catalog()
        .store(STORE_MESSAGES)
        .unwrap()
        .index_names()
        .map(String::from)
        .collect();
    assert_eq!(indexes, vec!["delivery", "number", "read", "timestamp"]);
    assert_eq!(
        db.catalog().index(STORE_MESSAGES, INDEX_DELIVERY).unwrap().key_path,
        "deliveryIndex"
    );
    assert!(db.catalog().index(STORE_MESSAGES, INDEX_NUMBER).unwrap().multi_entry);
    assert!(!db.catalog().index(STORE_MESSAGES, INDEX_READ).unwrap().multi_entry);

    let records: Vec<(_, MessageRecord)> = db
        .read(&[STORE_MESSAGES], |txn| txn.scan_all(STORE_MESSAGES))
        .unwrap();
    assert_eq!(records.len(), 3);
    for (_, record) in &records {
        assert_eq!(record.delivery_index, (record.delivery, record.timestamp));
        assert_eq!(record.number_index.len(), 2);
        assert_eq!(record.read_index, (record.read, record.timestamp));
    }
}

#[tokio::test]
async fn test_upgraded_data_is_queryable() {
    let fixture = TestFixture::on_backend(version_3_backend(), DatabaseConfig::default());

    let threads = fixture.db.get_thread_list().await.unwrap();
    let summary: Vec<_> = threads
        .iter()
        .map(|t| (t.sender_or_receiver.as_str(), t.id.get(), t.unread_count))
        .collect();
    assert_eq!(summary, vec![("+1002", 3, 1), ("+1001", 2, 1)]);

    let unread = MessageFilter::new().read(false);
    let ids = fixture.collect_ids(unread, false).await.unwrap();
    assert_eq!(ids, vec![MessageId::new(1), MessageId::new(3)]);

    // New ids continue after the migrated ones.
    let next = fixture.receive("+1001", "new", 30).await.unwrap();
    assert_eq!(next, MessageId::new(4));
}

#[tokio::test]
async fn test_newer_layout_refuses_to_open() {
    let backend = Arc::new(MemoryBackend::new());
    Database::open(backend.clone(), CURRENT_VERSION + 1, |txn, old, _| {
        migrate(txn, old, CURRENT_VERSION)
    })
    .unwrap();

    let fixture = TestFixture::on_backend(backend, DatabaseConfig::default());
    let err = fixture.db.open().await.unwrap_err();
    assert!(matches!(err, DbError::Store(StoreError::VersionTooNew { .. })));
    assert!(fixture.db.get_thread_list().await.is_err());
}
