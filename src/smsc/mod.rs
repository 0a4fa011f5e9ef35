//! The SMSC connector pool: the set of live connections to downstream SMS
//! centers, each wrapping one [`driver::SmscDriver`] behind a uniform
//! status/counter model the router can query without knowing the dialect.

pub mod driver;
pub mod mock;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::error::SmscError;
use crate::message::Sms;
use crate::queue::Counter;
use driver::{DriverEvent, SmscDriver};

/// Lifecycle status of one connector, driven by driver events and admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Connecting,
    Active,
    ReConnecting,
    Suspended,
    Shutdown,
    Dead,
}

impl fmt::Display for ConnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnStatus::Connecting => "connecting",
            ConnStatus::Active => "active",
            ConnStatus::ReConnecting => "re-connecting",
            ConnStatus::Suspended => "suspended",
            ConnStatus::Shutdown => "shutdown",
            ConnStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// A connector's eligibility classification for a given receiver, computed
/// fresh on every routing decision rather than cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usable {
    NotEligible,
    Eligible,
    Preferred,
}

/// Routing configuration for one connector: which receiver prefixes it may
/// carry, whether it should be preferred over merely-eligible peers, and the
/// same two selectors keyed on smsc-id rather than receiver prefix.
#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    pub allowed_prefixes: Vec<String>,
    pub denied_prefixes: Vec<String>,
    pub preferred_prefixes: Vec<String>,
    pub preferred_smsc_ids: Vec<String>,
    pub denied_smsc_ids: Vec<String>,
}

impl RouteConfig {
    fn matches_any(prefixes: &[String], receiver: &str) -> bool {
        prefixes.is_empty() || prefixes.iter().any(|p| receiver.starts_with(p.as_str()))
    }

    /// Classify a normalized receiver number against this connector's
    /// routing rules. `own_id` is the connector's own identity, checked
    /// against `denied_smsc_ids`/`preferred_smsc_ids`. `requested_smsc_id`,
    /// when set (the message explicitly named a target SMSC via
    /// `sms.smsc_id`), restricts eligibility to the one connector whose id
    /// matches it, overriding every other selector.
    pub fn usable(&self, own_id: &str, receiver: &str, requested_smsc_id: Option<&str>) -> Usable {
        if let Some(wanted) = requested_smsc_id {
            return if wanted == own_id {
                Usable::Eligible
            } else {
                Usable::NotEligible
            };
        }
        if !self.denied_smsc_ids.is_empty() && self.denied_smsc_ids.iter().any(|id| id == own_id) {
            return Usable::NotEligible;
        }
        if !self.denied_prefixes.is_empty()
            && self
                .denied_prefixes
                .iter()
                .any(|p| receiver.starts_with(p.as_str()))
        {
            return Usable::NotEligible;
        }
        if !Self::matches_any(&self.allowed_prefixes, receiver) {
            return Usable::NotEligible;
        }
        let preferred_by_id =
            !self.preferred_smsc_ids.is_empty() && self.preferred_smsc_ids.iter().any(|id| id == own_id);
        let preferred_by_prefix = !self.preferred_prefixes.is_empty()
            && self
                .preferred_prefixes
                .iter()
                .any(|p| receiver.starts_with(p.as_str()));
        if preferred_by_id || preferred_by_prefix {
            return Usable::Preferred;
        }
        Usable::Eligible
    }
}

struct MutableState {
    status: ConnStatus,
}

/// One live connection to an SMSC, pairing routing configuration and load
/// counters with a bound [`SmscDriver`]. Mutable status lives behind its own
/// `parking_lot::Mutex`, distinct from the pool's connector-list lock, per
/// the crate's lock-order discipline: connector-list lock is always taken
/// (if at all) before a given connector's own lock, and the two are never
/// both held across an `.await`.
pub struct SmscConn {
    pub id: String,
    pub route: RouteConfig,
    pub driver: Arc<dyn SmscDriver>,
    state: SyncMutex<MutableState>,
    pub sent: Counter,
    pub failed: Counter,
    pub queued: Counter,
}

impl SmscConn {
    pub fn new(id: impl Into<String>, route: RouteConfig, driver: Arc<dyn SmscDriver>) -> Self {
        SmscConn {
            id: id.into(),
            route,
            driver,
            state: SyncMutex::new(MutableState {
                status: ConnStatus::Connecting,
            }),
            sent: Counter::new(0),
            failed: Counter::new(0),
            queued: Counter::new(0),
        }
    }

    pub fn status(&self) -> ConnStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: ConnStatus) {
        self.state.lock().status = status;
    }

    pub fn usable(&self, receiver: &str, requested_smsc_id: Option<&str>) -> Usable {
        if self.status() != ConnStatus::Active {
            return Usable::NotEligible;
        }
        self.route.usable(&self.id, receiver, requested_smsc_id)
    }

    /// Current load estimate used to break ties between equally-eligible
    /// connectors: in-flight plus queued minus delivered, never negative.
    pub fn load(&self) -> i64 {
        (self.queued.get() - self.sent.get()).max(0)
    }

    async fn apply_event(&self, event: DriverEvent) {
        match event {
            DriverEvent::Connected => {
                self.set_status(ConnStatus::Active);
                info!(connector = %self.id, "smsc connector active");
            }
            DriverEvent::Sent(_id) => {
                self.sent.increase();
            }
            DriverEvent::SendFailed(id, reason) => {
                self.failed.increase();
                warn!(connector = %self.id, sms_id = id, %reason, "smsc send failed");
            }
            DriverEvent::Killed(reason) => {
                self.set_status(ConnStatus::ReConnecting);
                warn!(connector = %self.id, %reason, "smsc connector killed");
            }
            DriverEvent::Received(_sms) => {
                // Inbound traffic is handed to the admission pipeline by the
                // event-loop task in `ConnectorPool::add`, not here: this
                // method only updates connector-local bookkeeping.
            }
        }
    }
}

/// The live set of SMSC connectors, held behind an `RwLock` (the
/// connector-list mutex). Readers (the router) take a read lock and never
/// block while holding it; structural changes (add/remove) take a write
/// lock briefly and release it before touching any individual connector.
pub struct ConnectorPool {
    connectors: RwLock<Vec<Arc<SmscConn>>>,
    inbound: crate::queue::Queue<Sms>,
}

impl ConnectorPool {
    pub fn new(inbound: crate::queue::Queue<Sms>) -> Self {
        ConnectorPool {
            connectors: RwLock::new(Vec::new()),
            inbound,
        }
    }

    /// Register and start a connector. Connector-list lock is held only
    /// long enough to push into the vector; the driver's own connect loop
    /// runs on a spawned task and reports back via `events`.
    pub async fn add(&self, conn: Arc<SmscConn>) -> Result<(), SmscError> {
        let (tx, mut rx) = mpsc::channel::<DriverEvent>(64);
        conn.driver.start(tx).await?;

        let conn_for_task = conn.clone();
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            let producer = inbound.producer();
            while let Some(event) = rx.recv().await {
                if let DriverEvent::Received(ref sms) = event {
                    inbound.produce(sms.clone()).await;
                }
                conn_for_task.apply_event(event).await;
            }
            drop(producer);
        });

        let mut connectors = self.connectors.write().await;
        connectors.push(conn);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<SmscConn>> {
        let mut connectors = self.connectors.write().await;
        if let Some(pos) = connectors.iter().position(|c| c.id == id) {
            Some(connectors.remove(pos))
        } else {
            None
        }
    }

    /// Snapshot the current connector list. Callers iterate the snapshot,
    /// never the lock itself, so no await ever happens while the
    /// connector-list lock is held.
    pub async fn snapshot(&self) -> Vec<Arc<SmscConn>> {
        self.connectors.read().await.clone()
    }

    pub async fn find(&self, id: &str) -> Option<Arc<SmscConn>> {
        self.connectors
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn suspend(&self, id: &str) -> bool {
        if let Some(c) = self.find(id).await {
            c.set_status(ConnStatus::Suspended);
            true
        } else {
            false
        }
    }

    pub async fn resume(&self, id: &str) -> bool {
        if let Some(c) = self.find(id).await {
            c.set_status(ConnStatus::Active);
            true
        } else {
            false
        }
    }

    pub async fn shutdown_all(&self) {
        let connectors = self.snapshot().await;
        for conn in connectors {
            conn.set_status(ConnStatus::Shutdown);
            if let Err(err) = conn.driver.shutdown().await {
                warn!(connector = %conn.id, %err, "error shutting down connector");
            }
        }
    }
}
