//! Error types for the ArcView core.

use thiserror::Error;

/// Failures in the messaging listener.
///
/// Cloneable so the listener can both return an error and keep it as its
/// last observed error state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ListenerError {
    /// Could not open a broker connection
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Subscription request failed
    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Inbound payload was not a location message
    #[error("Could not decode location message: {0}")]
    Decode(String),

    /// Operation needs a live connection
    #[error("Not connected")]
    NotConnected,
}

/// Top-level errors for configuration and session setup.
#[derive(Debug, Error)]
pub enum ArcViewError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading a config file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or export JSON failed to (de)serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Listener failure surfaced to the caller
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

impl ArcViewError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
