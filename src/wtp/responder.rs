//! The WTP responder: owns every live transaction, converts inbound WDP
//! datagrams into state-machine events, and turns resulting actions back
//! into outbound WDP datagrams.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::machine::{Event, State, Transaction};
use super::pdu::{abort_code, Pdu, PduType, TID_VERIFICATION};
use crate::error::WtpError;
use crate::message::WdpDatagram;
use crate::queue::Queue;

/// Identifies one transaction by its peer endpoint and machine-local tid,
/// since the same tid value may be reused independently by different peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub peer_address: Vec<u8>,
    pub peer_port: u16,
    pub tid: u16,
}

/// The responder's shared state: the transaction table (the per-machine
/// lock is the transaction's own mutex; this table lock is held only long
/// enough to look up or insert an entry) and the outbound datagram queue.
pub struct WtpResponder {
    transactions: RwLock<HashMap<TransactionKey, Arc<Mutex<Transaction>>>>,
    pub outgoing: Queue<WdpDatagram>,
    local_port: u16,
}

impl WtpResponder {
    pub fn new(local_port: u16) -> Self {
        WtpResponder {
            transactions: RwLock::new(HashMap::new()),
            outgoing: Queue::new(),
            local_port,
        }
    }

    /// Look up (or create) the transaction for `key`, reporting whether it
    /// was freshly created — the signal the Invoke path uses to decide
    /// whether a tid asked to be verified is actually new.
    async fn transaction_for(&self, key: &TransactionKey) -> (Arc<Mutex<Transaction>>, bool) {
        if let Some(txn) = self.transactions.read().await.get(key) {
            return (txn.clone(), false);
        }
        let mut table = self.transactions.write().await;
        match table.entry(key.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => (entry.get().clone(), false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let txn = Arc::new(Mutex::new(Transaction::new(key.tid)));
                entry.insert(txn.clone());
                (txn, true)
            }
        }
    }

    /// Process one inbound WDP datagram carrying a WTP PDU: unpack it,
    /// translate it into an event on the right transaction, drain the
    /// resulting actions, and enqueue any reply datagrams.
    pub async fn handle_datagram(&self, datagram: WdpDatagram) -> Result<(), WtpError> {
        let pdu = Pdu::unpack(&datagram.user_data)?;
        let machine_tid = pdu.tid ^ 0x8000;
        let key = TransactionKey {
            peer_address: datagram.source_address.clone(),
            peer_port: datagram.source_port,
            tid: machine_tid,
        };

        let (txn, is_new) = self.transaction_for(&key).await;

        let event = match pdu.pdu_type {
            PduType::Invoke => {
                // A tid asked to be verified is valid only the first time we
                // see it; if we already hold a transaction under it, the
                // peer's claim that it is new does not hold.
                let tid_valid = if pdu.tid_verification == TID_VERIFICATION {
                    is_new
                } else {
                    true
                };
                Event::RcvInvoke {
                    tcl: pdu.tcl,
                    u_ack: pdu.u_ack,
                    tid_valid,
                    payload: pdu.payload.clone(),
                }
            }
            PduType::SegmentedInvoke => Event::RcvSegmentedInvoke {
                psn: pdu.psn,
                payload: pdu.payload.clone(),
                ttr: pdu.ttr,
            },
            PduType::Ack => Event::RcvAck {
                tid_verification: pdu.tid_verification,
                psn: pdu.psn,
                ttr: pdu.ttr,
            },
            PduType::Abort => Event::RcvAbort {
                reason: pdu.abort_reason.unwrap_or(abort_code::UNKNOWN),
            },
            other => {
                warn!(?other, "wtp responder received unsupported pdu type");
                return Ok(());
            }
        };

        let actions = {
            let mut guard = txn.lock().await;
            guard.push_event(event);
            guard.drain()?
        };

        for action in actions {
            let reply = WdpDatagram {
                source_address: vec![],
                source_port: self.local_port,
                destination_address: datagram.source_address.clone(),
                destination_port: datagram.source_port,
                user_data: action.pdu.pack(),
            };
            self.outgoing.produce(reply).await;
        }

        if self.transaction_is_terminal(&key).await {
            self.transactions.write().await.remove(&key);
            debug!(tid = key.tid, "wtp transaction retired");
        }

        Ok(())
    }

    /// Submit the application-layer result for a transaction the caller
    /// previously observed via [`Self::reassembled_payload`], segmenting it
    /// into multiple `SegmentedResult` datagrams if it exceeds one SAR chunk.
    pub async fn tr_result(&self, key: &TransactionKey, payload: Vec<u8>) -> Result<(), WtpError> {
        let (txn, _) = self.transaction_for(key).await;
        let actions = {
            let mut guard = txn.lock().await;
            guard.push_event(Event::TrResult { payload });
            guard.drain()?
        };
        for action in actions {
            let reply = WdpDatagram {
                source_address: vec![],
                source_port: self.local_port,
                destination_address: key.peer_address.clone(),
                destination_port: key.peer_port,
                user_data: action.pdu.pack(),
            };
            self.outgoing.produce(reply).await;
        }
        Ok(())
    }

    pub async fn reassembled_payload(&self, key: &TransactionKey) -> Option<Vec<u8>> {
        let txn = self.transactions.read().await.get(key)?.clone();
        let guard = txn.lock().await;
        Some(guard.reassembled_payload().to_vec())
    }

    async fn transaction_is_terminal(&self, key: &TransactionKey) -> bool {
        match self.transactions.read().await.get(key) {
            Some(txn) => txn.lock().await.state == State::WaitTimeoutState,
            None => false,
        }
    }
}

/// Run the responder as a long-lived task, consuming inbound datagrams
/// until `incoming` closes.
pub async fn run_responder(responder: Arc<WtpResponder>, incoming: Queue<WdpDatagram>) {
    while let Some(datagram) = incoming.consume().await {
        if let Err(err) = responder.handle_datagram(datagram).await {
            warn!(%err, "wtp responder failed to process datagram");
        }
    }
}
