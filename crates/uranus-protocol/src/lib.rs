//! Uranus Protocol - hackernel wire messages
//!
//! Every frame exchanged with the hackernel module is a JSON document
//! discriminated by its `type` field. Outbound frames configure the kernel
//! (protection toggles, subscriptions, trusted commands); inbound frames
//! carry audit reports and the liveness heartbeat.

pub mod command;
pub mod messages;

use thiserror::Error;

pub use command::{join_command, split_command, CommandParts, UNIT_SEPARATOR};
pub use messages::{InboundMessage, OutboundMessage, Section};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),
}
