//! Publish/subscribe transport abstraction for the ArcView listener.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{InboundMessage, SubscriptionId};

/// Opens connections to a publish/subscribe broker.
///
/// # Implementations
///
/// - **Production**: `NatsWsConnector` - NATS text protocol over WebSocket
/// - **Simulation**: `SimBrokerConnector` - in-memory channels with fault injection
///
/// A connector is cheap to keep around; the listener calls `connect` once
/// per attempt and owns the resulting connection.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Connection type produced by this connector.
    type Connection: BrokerConnection;

    /// Opens a connection to `endpoint`.
    ///
    /// # Returns
    /// * `Ok(conn)` - handshake complete, ready to subscribe
    /// * `Err(EnvError::ConnectionError)` - endpoint unreachable or handshake failed
    async fn connect(&self, endpoint: &str) -> Result<Self::Connection, EnvError>;
}

/// An open broker connection.
///
/// # Message Flow
///
/// ```text
/// Publisher              Broker                   Viewer
///   |                      |                        |
///   |                      |<--- subscribe(topic) --|
///   |-- publish(topic) --->|                        |
///   |                      |-- MSG ---------------->|-- next_message() -> msg
/// ```
#[async_trait]
pub trait BrokerConnection: Send + 'static {
    /// Subscribes to a subject.
    async fn subscribe(&mut self, subject: &str) -> Result<SubscriptionId, EnvError>;

    /// Receives the next message on any subscription.
    ///
    /// # Returns
    /// * `Some(msg)` - a message, in broker delivery order
    /// * `None` - the connection was closed by the broker or torn down
    ///
    /// # Blocking
    /// Waits until a message arrives or the connection closes. Must be
    /// cancel-safe: dropping the future must not lose a message.
    async fn next_message(&mut self) -> Option<InboundMessage>;

    /// Best-effort flush of outstanding work followed by close.
    async fn drain(&mut self) -> Result<(), EnvError>;
}
