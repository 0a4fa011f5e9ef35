//! The SMSC driver contract: a narrow vtable bound once at connector
//! creation, analogous to an `IpcTransport` trait object but scoped to
//! exactly the operations an SMSC dialect implementation needs to expose.

use async_trait::async_trait;

use crate::error::SmscError;
use crate::message::Sms;

/// Events a driver reports back to its owning [`super::SmscConn`]. The
/// connector reacts to these to update status/counters; the driver never
/// touches connector state directly.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// The underlying transport is connected and ready to accept traffic.
    Connected,
    /// An inbound (MO) message arrived from the SMSC.
    Received(Sms),
    /// A previously submitted message was acknowledged by the SMSC.
    Sent(u64),
    /// A previously submitted message failed permanently.
    SendFailed(u64, String),
    /// The driver's connection died; the connector should move to Reconnecting.
    Killed(String),
}

/// The per-SMSC-dialect implementation contract. One boxed trait object is
/// bound to each [`super::SmscConn`] at construction time and is never
/// swapped out for the lifetime of that connector.
#[async_trait]
pub trait SmscDriver: Send + Sync {
    /// Human-readable dialect name, used in logs and status output.
    fn name(&self) -> &str;

    /// Start the driver's connection loop. The driver owns its own I/O task
    /// and reports progress via `events`; this call returns once the task
    /// has been spawned, not once the connection is established.
    async fn start(
        &self,
        events: tokio::sync::mpsc::Sender<DriverEvent>,
    ) -> Result<(), SmscError>;

    /// Submit one outbound (MT) message to the SMSC. Errors here are
    /// necessarily synchronous (e.g. transport not ready); asynchronous
    /// delivery failures arrive later via [`DriverEvent::SendFailed`].
    async fn send_msg(&self, sms: &Sms) -> Result<(), SmscError>;

    /// Returns true while the driver believes it has outstanding capacity
    /// to accept more traffic without local buffering.
    async fn queued(&self) -> i64;

    /// Tear the driver's connection down cleanly.
    async fn shutdown(&self) -> Result<(), SmscError>;
}
