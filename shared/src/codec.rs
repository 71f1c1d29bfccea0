//! Frame encoding and decoding.
//!
//! Decode failures are reported as a typed [`DecodeError`] and never panic;
//! the transport layer logs and drops them without touching session state.

use crate::{Snapshot, WireMessage, HEARTBEAT_REPLY};
use thiserror::Error;

/// A successfully decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Snapshot(Snapshot),
    HeartbeatReply,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses a single wire frame into a snapshot or the liveness reply token.
pub fn decode_inbound(raw: &str) -> Result<Inbound, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    if trimmed == HEARTBEAT_REPLY {
        return Ok(Inbound::HeartbeatReply);
    }

    let snapshot: Snapshot = serde_json::from_str(trimmed)?;
    Ok(Inbound::Snapshot(snapshot))
}

/// Serializes an outbound message into a single wire frame.
pub fn encode_outbound(message: &WireMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
