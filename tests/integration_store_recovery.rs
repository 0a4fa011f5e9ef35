//! S7: a message saved and acked before restart does not replay; a message
//! saved but never acked does, and with its original id preserved.

use bearerbox::message::{NackReason, Sms};
use bearerbox::store::MessageStore;
use tempfile::tempdir;

fn sms(receiver: &str) -> Sms {
    Sms {
        sender: Some(b"100".to_vec()),
        receiver: Some(receiver.as_bytes().to_vec()),
        msgdata: Some(b"hello world".to_vec()),
        ..Default::default()
    }
}

#[tokio::test]
async fn store_replay_after_restart_yields_only_unacked_messages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bearerbox.store");

    let store = MessageStore::init(&path).await.unwrap();
    let mut delivered = sms("100001");
    let mut pending_forever = sms("100002");

    store.save(&mut delivered).await.unwrap();
    store.save(&mut pending_forever).await.unwrap();
    store
        .save_ack(delivered.id, NackReason::None)
        .await
        .unwrap();
    store.shutdown().await.unwrap();
    drop(store);

    let (_reopened, pending) = MessageStore::init_and_load(&path).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, pending_forever.id);
    assert_eq!(pending[0].receiver.as_deref(), Some(&b"100002"[..]));
}

#[tokio::test]
async fn empty_store_starts_with_no_pending_messages() {
    let dir = tempdir().unwrap();
    let (_store, pending) = MessageStore::init_and_load(dir.path().join("bearerbox.store"))
        .await
        .unwrap();
    assert!(pending.is_empty());
}
