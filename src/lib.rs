//! # Bearerbox
//!
//! The message-switching core of an SMS/WAP gateway: an SMSC connector
//! pool, an SMS router, an inbound admission filter, a crash-recoverable
//! message store, a box-connection multiplexer for smsbox/wapbox peers,
//! and a WTP responder, all wired together by a supervisor.

pub mod admission;
pub mod admin;
pub mod boxc;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod queue;
pub mod router;
pub mod smsc;
pub mod store;
pub mod supervisor;
pub mod wtp;

pub use error::BearerboxError;
pub use message::Message;
pub use supervisor::Supervisor;

/// The current version of the bearerbox core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
