//! Messaging listener - connection state machine and location decoding.
//!
//! # State machine
//!
//! ```text
//!                 connect()                 ok
//!  Disconnected ───────────► Connecting ─────────► Connected ──drain()──► Draining ──► Disconnected
//!       ▲                        │  ▲                  │
//!       │                        │  │ retry due         │ stream closed
//!       │                   fail ▼  │                  ▼
//!       │                      Error ◄──────────── (subscribe fails)
//!       └──────────────────────────────────────── Disconnected
//! ```
//!
//! The listener never sleeps on its own. `next_retry_delay()` tells the
//! driver when the next attempt is allowed under the `RetryPolicy`;
//! `None` means give up (until `reset_retries()`, the manual path).

use std::time::Duration;

use arcview_env::{BrokerConnection, BrokerConnector, InboundMessage, SubscriptionId};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ListenerError;
use crate::geodesy::Coordinate;

/// Default pub/sub topic for location updates.
pub const DEFAULT_TOPIC: &str = "students.locations";

/// Default broker WebSocket endpoint.
pub const DEFAULT_BROKER_URL: &str = "ws://192.168.29.195:9090";

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Error { failed_attempts: u32 },
    Draining,
}

/// Exponential backoff for connection attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff_ms: u64,

    /// Growth factor per failed attempt
    pub multiplier: f64,

    /// Upper bound on any single delay
    pub max_backoff_ms: u64,

    /// Reconnect when an established connection is closed by the broker
    pub reconnect_on_loss: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 8_000,
            reconnect_on_loss: true,
        }
    }
}

impl RetryPolicy {
    /// One attempt, no automatic reconnection.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            reconnect_on_loss: false,
            ..Self::default()
        }
    }

    /// Delay before the next attempt after `failed_attempts` consecutive
    /// failures, or `None` once the budget is spent.
    pub fn delay_after(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts >= self.max_attempts {
            return None;
        }
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64);
        Some(Duration::from_millis(capped as u64))
    }

    /// Delay before reconnecting after a dropped connection.
    pub fn delay_after_loss(&self) -> Option<Duration> {
        if !self.reconnect_on_loss {
            return None;
        }
        Some(Duration::from_millis(self.initial_backoff_ms.min(self.max_backoff_ms)))
    }
}

#[derive(Debug, Deserialize)]
struct LocationEnvelope {
    msg: LocationBody,
}

#[derive(Debug, Deserialize)]
struct LocationBody {
    latitude: f64,
    longitude: f64,
}

/// Decodes `{ "msg": { "latitude": .., "longitude": .. } }`.
pub fn decode_location(payload: &[u8]) -> Result<Coordinate, ListenerError> {
    let envelope: LocationEnvelope =
        serde_json::from_slice(payload).map_err(|e| ListenerError::Decode(e.to_string()))?;
    Ok(Coordinate::new(envelope.msg.longitude, envelope.msg.latitude))
}

/// Counters kept by the listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListenerStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub messages_received: u64,
    pub decode_failures: u64,
    pub connections_lost: u64,
}

/// Subscribes to the location topic and decodes inbound messages.
pub struct OriginListener<C: BrokerConnector> {
    connector: C,
    endpoint: String,
    topic: String,
    policy: RetryPolicy,

    connection: Option<C::Connection>,
    subscription: Option<SubscriptionId>,
    state: ConnectionState,

    /// Consecutive failures since the last success
    failed_attempts: u32,
    last_error: Option<ListenerError>,
    stats: ListenerStats,
}

impl<C: BrokerConnector> OriginListener<C> {
    pub fn new(
        connector: C,
        endpoint: impl Into<String>,
        topic: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            topic: topic.into(),
            policy,
            connection: None,
            subscription: None,
            state: ConnectionState::Disconnected,
            failed_attempts: 0,
            last_error: None,
            stats: ListenerStats::default(),
        }
    }

    /// Makes one connection attempt.
    pub async fn connect(&mut self) -> Result<(), ListenerError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let attempt = self.failed_attempts + 1;
        self.state = ConnectionState::Connecting { attempt };
        self.stats.connect_attempts += 1;
        info!("connecting to {} (attempt {})", self.endpoint, attempt);

        let result = self.connector.connect(&self.endpoint).await;
        match result {
            Ok(conn) => {
                self.connection = Some(conn);
                self.state = ConnectionState::Connected;
                self.failed_attempts = 0;
                Ok(())
            }
            Err(e) => {
                let err = ListenerError::Connect {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                };
                Err(self.fail(err))
            }
        }
    }

    /// Subscribes to the configured topic on the live connection.
    ///
    /// A failed subscription tears the connection down and counts as a
    /// failed attempt.
    pub async fn subscribe(&mut self) -> Result<SubscriptionId, ListenerError> {
        let conn = self.connection.as_mut().ok_or(ListenerError::NotConnected)?;

        let result = conn.subscribe(&self.topic).await;
        match result {
            Ok(sid) => {
                self.subscription = Some(sid);
                info!("listening for {} requests...", self.topic);
                Ok(sid)
            }
            Err(e) => {
                let err = ListenerError::Subscribe {
                    topic: self.topic.clone(),
                    reason: e.to_string(),
                };
                if let Some(mut conn) = self.connection.take() {
                    let _ = conn.drain().await;
                }
                Err(self.fail(err))
            }
        }
    }

    fn fail(&mut self, err: ListenerError) -> ListenerError {
        error!("{}", err);
        self.failed_attempts += 1;
        self.stats.connect_failures += 1;
        self.state = ConnectionState::Error {
            failed_attempts: self.failed_attempts,
        };
        self.last_error = Some(err.clone());
        err
    }

    /// Waits for the next inbound message.
    ///
    /// Never resolves while there is no connection. When the broker
    /// closes the stream, the listener moves to `Disconnected` and this
    /// returns `None`.
    pub async fn next_message(&mut self) -> Option<InboundMessage> {
        let Some(conn) = self.connection.as_mut() else {
            return std::future::pending().await;
        };

        let msg = conn.next_message().await;
        match msg {
            Some(msg) => {
                self.stats.messages_received += 1;
                Some(msg)
            }
            None => {
                warn!("connection to {} closed by broker", self.endpoint);
                self.connection = None;
                self.subscription = None;
                self.state = ConnectionState::Disconnected;
                self.stats.connections_lost += 1;
                None
            }
        }
    }

    /// Decodes a payload into an origin coordinate.
    ///
    /// A decode failure is logged and kept as `last_error`; the listener
    /// carries on with the next message.
    pub fn handle_payload(&mut self, payload: &[u8]) -> Result<Coordinate, ListenerError> {
        decode_location(payload).map_err(|err| {
            warn!("dropping message: {}", err);
            self.stats.decode_failures += 1;
            self.last_error = Some(err.clone());
            err
        })
    }

    /// Delay until the next automatic attempt, if one is allowed.
    pub fn next_retry_delay(&self) -> Option<Duration> {
        match self.state {
            ConnectionState::Error { failed_attempts } => self.policy.delay_after(failed_attempts),
            _ => None,
        }
    }

    /// Manual reconnect path: forget past failures.
    pub fn reset_retries(&mut self) {
        self.failed_attempts = 0;
        if matches!(self.state, ConnectionState::Error { .. }) {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Best-effort close of the connection.
    pub async fn drain(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            self.state = ConnectionState::Draining;
            if let Err(e) = conn.drain().await {
                warn!("drain of {} failed: {}", self.endpoint, e);
            }
        }
        self.subscription = None;
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    pub fn last_error(&self) -> Option<&ListenerError> {
        self.last_error.as_ref()
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use arcview_env::EnvError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Connector whose attempts fail a set number of times, then hand out
    /// channel-backed connections.
    pub(crate) struct ScriptedConnector {
        failures_left: Arc<Mutex<u32>>,
        inboxes: Arc<Mutex<VecDeque<mpsc::UnboundedReceiver<InboundMessage>>>>,
    }

    pub(crate) struct ScriptedConnection {
        rx: mpsc::UnboundedReceiver<InboundMessage>,
    }

    impl ScriptedConnector {
        /// Returns the connector and the sender feeding its first connection.
        pub(crate) fn new(failures: u32) -> (Self, mpsc::UnboundedSender<InboundMessage>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Self {
                failures_left: Arc::new(Mutex::new(failures)),
                inboxes: Arc::new(Mutex::new(VecDeque::from([rx]))),
            };
            (connector, tx)
        }
    }

    #[async_trait]
    impl BrokerConnector for ScriptedConnector {
        type Connection = ScriptedConnection;

        async fn connect(&self, endpoint: &str) -> Result<ScriptedConnection, EnvError> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(EnvError::connection(format!("{endpoint} refused")));
                }
            }
            let rx = self
                .inboxes
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EnvError::connection("no inbox left"))?;
            Ok(ScriptedConnection { rx })
        }
    }

    #[async_trait]
    impl BrokerConnection for ScriptedConnection {
        async fn subscribe(&mut self, _subject: &str) -> Result<SubscriptionId, EnvError> {
            Ok(SubscriptionId(1))
        }

        async fn next_message(&mut self) -> Option<InboundMessage> {
            self.rx.recv().await
        }

        async fn drain(&mut self) -> Result<(), EnvError> {
            self.rx.close();
            Ok(())
        }
    }

    pub(crate) fn location(lon: f64, lat: f64) -> InboundMessage {
        let body = format!(r#"{{"msg":{{"latitude":{lat},"longitude":{lon}}}}}"#);
        InboundMessage::new(DEFAULT_TOPIC, SubscriptionId(1), body.into_bytes())
    }

    fn listener_with(
        connector: ScriptedConnector,
        policy: RetryPolicy,
    ) -> OriginListener<ScriptedConnector> {
        OriginListener::new(connector, "ws://broker", DEFAULT_TOPIC, policy)
    }

    #[test]
    fn test_decode_location() {
        let coord = decode_location(br#"{"msg":{"latitude":30.5,"longitude":76.25}}"#).unwrap();
        assert_eq!(coord, Coordinate::new(76.25, 30.5));
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        assert!(matches!(decode_location(b"not json"), Err(ListenerError::Decode(_))));
        assert!(matches!(
            decode_location(br#"{"latitude":1,"longitude":2}"#),
            Err(ListenerError::Decode(_))
        ));
        assert!(matches!(
            decode_location(br#"{"msg":{"latitude":"x","longitude":2}}"#),
            Err(ListenerError::Decode(_))
        ));
    }

    #[test]
    fn test_retry_policy_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 3_000,
            reconnect_on_loss: true,
        };

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(3_000)));
        assert_eq!(policy.delay_after(10), None);
    }

    #[test]
    fn test_retry_policy_never() {
        let policy = RetryPolicy::never();

        assert_eq!(policy.delay_after(1), None);
        assert_eq!(policy.delay_after_loss(), None);
    }

    #[tokio::test]
    async fn test_connect_failure_enters_error_state() {
        let (connector, _tx) = ScriptedConnector::new(1);
        let mut listener = listener_with(connector, RetryPolicy::default());

        assert!(listener.connect().await.is_err());
        assert_eq!(listener.state(), ConnectionState::Error { failed_attempts: 1 });
        assert!(matches!(listener.last_error(), Some(ListenerError::Connect { .. })));
        assert_eq!(listener.next_retry_delay(), Some(Duration::from_millis(500)));

        assert!(listener.connect().await.is_ok());
        assert_eq!(listener.state(), ConnectionState::Connected);
        assert_eq!(listener.next_retry_delay(), None);
        assert_eq!(listener.stats().connect_attempts, 2);
    }

    #[tokio::test]
    async fn test_retries_exhaust() {
        let (connector, _tx) = ScriptedConnector::new(10);
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let mut listener = listener_with(connector, policy);

        assert!(listener.connect().await.is_err());
        assert!(listener.next_retry_delay().is_some());
        assert!(listener.connect().await.is_err());
        assert_eq!(listener.next_retry_delay(), None);

        listener.reset_retries();
        assert_eq!(listener.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let (connector, _tx) = ScriptedConnector::new(0);
        let mut listener = listener_with(connector, RetryPolicy::never());

        assert_eq!(listener.subscribe().await, Err(ListenerError::NotConnected));
    }

    #[tokio::test]
    async fn test_messages_in_delivery_order_then_loss() {
        let (connector, tx) = ScriptedConnector::new(0);
        let mut listener = listener_with(connector, RetryPolicy::default());
        listener.connect().await.unwrap();
        listener.subscribe().await.unwrap();

        tx.send(location(1.0, 2.0)).unwrap();
        tx.send(location(3.0, 4.0)).unwrap();
        drop(tx);

        let first = listener.next_message().await.unwrap();
        let second = listener.next_message().await.unwrap();
        assert_eq!(listener.handle_payload(&first.payload), Ok(Coordinate::new(1.0, 2.0)));
        assert_eq!(listener.handle_payload(&second.payload), Ok(Coordinate::new(3.0, 4.0)));

        assert!(listener.next_message().await.is_none());
        assert_eq!(listener.state(), ConnectionState::Disconnected);
        assert_eq!(listener.stats().connections_lost, 1);
    }

    #[tokio::test]
    async fn test_decode_failure_is_recorded_not_fatal() {
        let (connector, _tx) = ScriptedConnector::new(0);
        let mut listener = listener_with(connector, RetryPolicy::default());

        assert!(listener.handle_payload(b"{}").is_err());
        assert!(matches!(listener.last_error(), Some(ListenerError::Decode(_))));
        assert_eq!(listener.stats().decode_failures, 1);

        assert!(listener.handle_payload(br#"{"msg":{"latitude":0,"longitude":0}}"#).is_ok());
    }

    #[tokio::test]
    async fn test_drain_returns_to_disconnected() {
        let (connector, _tx) = ScriptedConnector::new(0);
        let mut listener = listener_with(connector, RetryPolicy::default());
        listener.connect().await.unwrap();
        listener.subscribe().await.unwrap();

        listener.drain().await;

        assert_eq!(listener.state(), ConnectionState::Disconnected);
        assert!(!listener.is_connected());
        assert_eq!(listener.subscription(), None);
    }
}
