//! Inbound admission: the filter every MO message passes through before it
//! is persisted and handed to the router.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::message::{Sms, SmsType};
use crate::queue::{Counter, Queue};
use crate::router::unified_prefix;
use crate::store::MessageStore;

/// Access-list configuration applied uniformly to every inbound message,
/// independent of which SMSC it arrived on.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    pub white_list: Vec<String>,
    pub black_list: Vec<String>,
}

impl AccessList {
    fn permits(&self, sender: &str) -> bool {
        if !self.black_list.is_empty() && self.black_list.iter().any(|p| sender.starts_with(p.as_str())) {
            return false;
        }
        if !self.white_list.is_empty() {
            return self.white_list.iter().any(|p| sender.starts_with(p.as_str()));
        }
        true
    }
}

/// Counters tracking admission outcomes, exposed for status reporting.
#[derive(Debug, Default)]
pub struct AdmissionCounters {
    pub accepted: Counter,
    pub rejected: Counter,
}

/// Run one message through admission: normalize the sender, check the
/// access list, tag it as an MO message, persist it, then enqueue it for
/// routing. Returns `Ok(true)` if the message was admitted, `Ok(false)` if
/// it was filtered out, and an error only on a store failure.
pub async fn admit(
    sms: Sms,
    access: &AccessList,
    store: &Arc<MessageStore>,
    outgoing: &Queue<Sms>,
    counters: &AdmissionCounters,
) -> Result<bool, StoreError> {
    let mut sms = sms;
    sms.sms_type = SmsType::Mo;

    let sender = sms
        .sender
        .as_deref()
        .map(|b| String::from_utf8_lossy(b).to_string())
        .unwrap_or_default();
    let normalized = unified_prefix(&sender);

    if !access.permits(&normalized) {
        warn!(sender = %normalized, "message rejected by access list");
        counters.rejected.increase();
        return Ok(false);
    }

    store.save(&mut sms).await?;
    debug!(sms_id = sms.id, sender = %normalized, "message admitted");
    counters.accepted.increase();
    outgoing.produce(sms).await;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sms_from(sender: &str) -> Sms {
        Sms {
            sender: Some(sender.as_bytes().to_vec()),
            receiver: Some(b"5550001".to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn admits_message_not_on_any_list() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MessageStore::init(dir.path().join("store.log")).await.unwrap());
        let outgoing = Queue::new();
        let counters = AdmissionCounters::default();
        let access = AccessList::default();

        let admitted = admit(sms_from("441234"), &access, &store, &outgoing, &counters)
            .await
            .unwrap();
        assert!(admitted);
        assert_eq!(counters.accepted.get(), 1);
        assert_eq!(outgoing.len().await, 1);
    }

    #[tokio::test]
    async fn rejects_blacklisted_sender() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MessageStore::init(dir.path().join("store.log")).await.unwrap());
        let outgoing = Queue::new();
        let counters = AdmissionCounters::default();
        let access = AccessList {
            white_list: vec![],
            black_list: vec!["441".to_string()],
        };

        let admitted = admit(sms_from("441234"), &access, &store, &outgoing, &counters)
            .await
            .unwrap();
        assert!(!admitted);
        assert_eq!(counters.rejected.get(), 1);
        assert_eq!(outgoing.len().await, 0);
    }

    #[tokio::test]
    async fn whitelist_only_admits_matching_senders() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MessageStore::init(dir.path().join("store.log")).await.unwrap());
        let outgoing = Queue::new();
        let counters = AdmissionCounters::default();
        let access = AccessList {
            white_list: vec!["44".to_string()],
            black_list: vec![],
        };

        assert!(admit(sms_from("44999"), &access, &store, &outgoing, &counters)
            .await
            .unwrap());
        assert!(!admit(sms_from("33999"), &access, &store, &outgoing, &counters)
            .await
            .unwrap());
    }
}
