//! WTP (Wireless Transaction Protocol) responder: PDU framing, the
//! per-transaction state machine, and the responder that ties them to the
//! WDP datagram queues.

pub mod machine;
pub mod pdu;
pub mod responder;

pub use responder::{run_responder, TransactionKey, WtpResponder};
