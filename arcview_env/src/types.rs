//! Common types for the ArcView environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one broker connection.
///
/// Used as the client name in the NATS `CONNECT` handshake and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Creates a new random ConnectionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ConnectionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Subscription identifier (the NATS `sid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message delivered by the broker on a subscribed subject.
///
/// The payload is opaque bytes; decoding is the listener's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Subject the message was published on
    pub subject: String,

    /// Subscription that matched
    pub sid: SubscriptionId,

    /// Optional reply subject
    pub reply_to: Option<String>,

    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Creates a message without a reply subject.
    pub fn new(subject: impl Into<String>, sid: SubscriptionId, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            sid,
            reply_to: None,
            payload,
        }
    }
}
