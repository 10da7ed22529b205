//! Error types for the ArcView environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Could not open the transport to the broker
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The connection exists but the operation could not be carried out
    /// (socket closed, write failed, not subscribed, ...)
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The broker answered with something we could not parse
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The broker rejected an operation (`-ERR`)
    #[error("Broker rejected operation: {0}")]
    BrokerRejected(String),
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EnvError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::TransportError(err.to_string())
    }
}
