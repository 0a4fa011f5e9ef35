//! Typed error surfaces for each component boundary, aggregated into
//! [`BearerboxError`] for propagation up to the binary edge where `anyhow`
//! takes over for context-chained reporting.

use thiserror::Error;

use crate::message::CodecError;

/// Errors from the persistent message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("store record codec failure: {0}")]
    Codec(#[from] CodecError),

    #[error("store is shutting down")]
    ShuttingDown,

    #[error("store compaction failed: {0}")]
    CompactionFailed(String),
}

/// Outcome classes from the router's `rout()` algorithm.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no connectors configured")]
    NoConnectors,

    #[error("no eligible connector found for receiver")]
    NoEligibleConnector,

    #[error("message rejected by driver: {0}")]
    Rejected(String),
}

/// Errors surfaced by the WTP responder, always converted into an Abort PDU
/// or a TR-Abort.ind rather than dropped silently.
#[derive(Debug, Error)]
pub enum WtpError {
    #[error("malformed PDU header")]
    InvalidHeader,

    #[error("unknown PDU type {0}")]
    UnknownPduType(u8),

    #[error("retransmission ceiling reached")]
    RetransmissionCeiling,

    #[error("transaction not found for tid {0}")]
    UnknownTransaction(u16),

    #[error("segmentation state inconsistent: {0}")]
    BadSegmentation(String),
}

/// Errors from the SMSC connector pool.
#[derive(Debug, Error)]
pub enum SmscError {
    #[error("connector '{0}' is not running")]
    NotRunning(String),

    #[error("connector '{0}' failed to start: {1}")]
    StartFailed(String, String),

    #[error("driver send failed: {0}")]
    SendFailed(String),
}

/// Errors from the box connection multiplexer.
#[derive(Debug, Error)]
pub enum BoxError {
    #[error("peer closed connection before identify handshake")]
    NoIdentify,

    #[error("box I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("box framing failure: {0}")]
    Codec(#[from] CodecError),
}

/// Aggregate error type used across crate-internal `Result`s where a caller
/// cannot usefully distinguish the source boundary.
#[derive(Debug, Error)]
pub enum BearerboxError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Wtp(#[from] WtpError),

    #[error(transparent)]
    Smsc(#[from] SmscError),

    #[error(transparent)]
    Box(#[from] BoxError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
