//! Property tests against the reference model.

use std::collections::BTreeMap;

use msgstore::{DbError, MessageFilter, MessageId};
use msgstore_testkit::generators::{filter, ops};
use msgstore_testkit::{ExpectedThread, Op, ReferenceModel, TestFixture};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Apply `ops` to both the database and the model. Returns the ids assigned
/// by saves, in order.
async fn replay(fixture: &TestFixture, model: &mut ReferenceModel, ops: &[Op]) -> Vec<MessageId> {
    let db = &fixture.db;
    let mut saved = Vec::new();
    for op in ops {
        match op {
            Op::Receive(raw) | Op::Send(raw) => {
                let id = if matches!(op, Op::Receive(_)) {
                    db.save_received(raw.clone()).await.unwrap()
                } else {
                    db.save_sending(raw.clone()).await.unwrap()
                };
                model.insert(db.get_message(id).await.unwrap());
                saved.push(id);
            }
            Op::Delete(i) => {
                if saved.is_empty() {
                    continue;
                }
                let id = saved[i % saved.len()];
                assert_eq!(db.delete_message(id).await.unwrap(), model.remove(id));
            }
            Op::MarkRead(i, read) => {
                if saved.is_empty() {
                    continue;
                }
                let id = saved[i % saved.len()];
                match db.mark_read(id, *read).await {
                    Ok(value) => {
                        assert_eq!(value, *read);
                        model.set_read(id, *read);
                    }
                    Err(DbError::MessageNotFound(_)) => assert!(model.get(id).is_none()),
                    Err(e) => panic!("mark_read failed: {}", e),
                }
            }
        }
    }
    saved
}

async fn stored_threads(fixture: &TestFixture) -> BTreeMap<String, ExpectedThread> {
    fixture
        .db
        .get_thread_list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| {
            (
                t.sender_or_receiver,
                ExpectedThread {
                    id: t.id,
                    timestamp: t.timestamp,
                    body: t.body,
                    unread_count: t.unread_count,
                },
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_ids_strictly_increase(ops in ops(30)) {
        let saved = runtime().block_on(async {
            let fixture = TestFixture::new();
            replay(&fixture, &mut ReferenceModel::new(), &ops).await
        });
        prop_assert!(saved.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rollups_match_model(ops in ops(30)) {
        let (stored, expected) = runtime().block_on(async {
            let fixture = TestFixture::new();
            let mut model = ReferenceModel::new();
            replay(&fixture, &mut model, &ops).await;
            (stored_threads(&fixture).await, model.threads())
        });
        prop_assert_eq!(stored, expected);
    }

    #[test]
    fn test_lists_match_model(
        ops in ops(30),
        filter in filter(),
        reverse in any::<bool>(),
        batch in 1usize..5,
    ) {
        let (got, expected) = runtime().block_on(async {
            let fixture = TestFixture::with_batch_size(batch);
            let mut model = ReferenceModel::new();
            replay(&fixture, &mut model, &ops).await;
            let got = fixture.collect_ids(filter.clone(), reverse).await.unwrap();
            (got, model.matching(&filter, reverse))
        });
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn test_cleared_list_is_gone(ops in ops(15)) {
        let outcome = runtime().block_on(async {
            let fixture = TestFixture::with_batch_size(1);
            replay(&fixture, &mut ReferenceModel::new(), &ops).await;
            match fixture.db.create_message_list(MessageFilter::new(), false).await.unwrap() {
                msgstore::ListCreation::Empty => None,
                msgstore::ListCreation::Created { list_id, .. } => {
                    fixture.db.clear_message_list(list_id).unwrap();
                    let next = fixture.db.get_next_message_in_list(list_id).await;
                    Some((matches!(next, Err(DbError::ListNotFound(_))), fixture.db.stats().open_lists))
                }
            }
        });
        if let Some((not_found, open)) = outcome {
            prop_assert!(not_found);
            prop_assert_eq!(open, 0);
        }
    }
}
