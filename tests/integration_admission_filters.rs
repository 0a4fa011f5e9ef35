//! S4: inbound admission honors white/black lists and persists admitted
//! messages to the store before handing them to the router queue.

use std::sync::Arc;

use bearerbox::admission::{admit, AccessList, AdmissionCounters};
use bearerbox::message::Sms;
use bearerbox::queue::Queue;
use bearerbox::store::MessageStore;
use tempfile::tempdir;

fn mo_from(sender: &str) -> Sms {
    Sms {
        sender: Some(sender.as_bytes().to_vec()),
        receiver: Some(b"12000".to_vec()),
        msgdata: Some(b"hi".to_vec()),
        ..Default::default()
    }
}

#[tokio::test]
async fn s4_blacklisted_sender_is_rejected_and_not_persisted() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        MessageStore::init(dir.path().join("store.log"))
            .await
            .unwrap(),
    );
    let outgoing = Queue::new();
    let counters = AdmissionCounters::default();
    let access = AccessList {
        white_list: vec![],
        black_list: vec!["1900".into()],
    };

    let admitted = admit(mo_from("1900555"), &access, &store, &outgoing, &counters)
        .await
        .unwrap();

    assert!(!admitted);
    assert_eq!(counters.rejected.get(), 1);
    assert_eq!(counters.accepted.get(), 0);
    assert_eq!(outgoing.len().await, 0);
    assert!(store.dump().await.unwrap().is_empty());
}

#[tokio::test]
async fn s4_permitted_sender_is_persisted_and_enqueued() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        MessageStore::init(dir.path().join("store.log"))
            .await
            .unwrap(),
    );
    let outgoing = Queue::new();
    let counters = AdmissionCounters::default();
    let access = AccessList::default();

    let admitted = admit(mo_from("447000"), &access, &store, &outgoing, &counters)
        .await
        .unwrap();

    assert!(admitted);
    assert_eq!(counters.accepted.get(), 1);
    assert_eq!(outgoing.len().await, 1);
    assert_eq!(store.dump().await.unwrap().len(), 1);
}
