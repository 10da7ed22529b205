//! In-memory pub/sub broker with fault injection.
//!
//! ```text
//!   publisher ──publish()──► SimBroker ──► SimBrokerConnection ──► OriginListener
//!                               ▲
//!          SimBrokerController ─┘  (offline, refuse connects, reject SUB)
//! ```
//!
//! Delivery is immediate and in publish order. Messages published while no
//! connection is subscribed are dropped, like a NATS subject with no
//! interest.

use arcview_env::{
    BrokerConnection, BrokerConnector, ConnectionId, EnvError, InboundMessage, SubscriptionId,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Counters kept by the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BrokerStats {
    pub connects: u64,
    pub refused_connects: u64,
    pub rejected_subscribes: u64,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
}

struct ClientEntry {
    tx: mpsc::UnboundedSender<InboundMessage>,

    /// subject -> sid
    subscriptions: HashMap<String, SubscriptionId>,
}

struct BrokerState {
    online: bool,
    refuse_connects: u32,
    reject_subscribe: bool,
    next_connection: u64,
    clients: HashMap<ConnectionId, ClientEntry>,
    stats: BrokerStats,
}

type SharedState = Arc<Mutex<BrokerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The broker itself; cheap to clone, all clones share state.
#[derive(Clone)]
pub struct SimBroker {
    state: SharedState,
}

impl SimBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                refuse_connects: 0,
                reject_subscribe: false,
                next_connection: 0,
                clients: HashMap::new(),
                stats: BrokerStats::default(),
            })),
        }
    }

    pub fn connector(&self) -> SimBrokerConnector {
        SimBrokerConnector {
            state: Arc::clone(&self.state),
        }
    }

    pub fn controller(&self) -> SimBrokerController {
        SimBrokerController {
            state: Arc::clone(&self.state),
        }
    }

    /// Publishes `payload` on `subject`.
    ///
    /// Returns the number of subscribers it was delivered to.
    pub fn publish(&self, subject: &str, payload: Vec<u8>) -> usize {
        let mut state = lock(&self.state);
        state.stats.published += 1;

        let mut delivered = 0;
        for client in state.clients.values() {
            if let Some(sid) = client.subscriptions.get(subject) {
                let msg = InboundMessage::new(subject, *sid, payload.clone());
                if client.tx.send(msg).is_ok() {
                    delivered += 1;
                }
            }
        }

        if delivered == 0 {
            state.stats.dropped += 1;
        }
        state.stats.delivered += delivered as u64;
        delivered
    }

    pub fn stats(&self) -> BrokerStats {
        lock(&self.state).stats.clone()
    }
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Fault injection handle.
pub struct SimBrokerController {
    state: SharedState,
}

impl SimBrokerController {
    /// Drops every connection and refuses new ones until `go_online`.
    pub fn go_offline(&self) {
        let mut state = lock(&self.state);
        state.online = false;
        let closed = state.clients.len();
        // dropping the senders ends each client's stream
        state.clients.clear();
        debug!("broker offline, closed {} connections", closed);
    }

    pub fn go_online(&self) {
        lock(&self.state).online = true;
        debug!("broker online");
    }

    /// Refuses the next `count` connection attempts.
    pub fn refuse_next_connects(&self, count: u32) {
        lock(&self.state).refuse_connects = count;
    }

    /// Rejects subscription requests while set.
    pub fn set_reject_subscribe(&self, reject: bool) {
        lock(&self.state).reject_subscribe = reject;
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.state).clients.len()
    }
}

/// Opens connections to a `SimBroker`.
#[derive(Clone)]
pub struct SimBrokerConnector {
    state: SharedState,
}

#[async_trait]
impl BrokerConnector for SimBrokerConnector {
    type Connection = SimBrokerConnection;

    async fn connect(&self, endpoint: &str) -> Result<SimBrokerConnection, EnvError> {
        let mut state = lock(&self.state);

        if !state.online {
            state.stats.refused_connects += 1;
            return Err(EnvError::connection(format!("{endpoint}: broker offline")));
        }
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            state.stats.refused_connects += 1;
            return Err(EnvError::connection(format!("{endpoint}: connection refused")));
        }

        let id = ConnectionId::from_seed(state.next_connection);
        state.next_connection += 1;
        state.stats.connects += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        state.clients.insert(
            id,
            ClientEntry {
                tx,
                subscriptions: HashMap::new(),
            },
        );
        debug!("connection {} opened", id);

        Ok(SimBrokerConnection {
            id,
            rx,
            next_sid: 1,
            state: Arc::clone(&self.state),
        })
    }
}

/// One client connection to a `SimBroker`.
pub struct SimBrokerConnection {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    next_sid: u64,
    state: SharedState,
}

#[async_trait]
impl BrokerConnection for SimBrokerConnection {
    async fn subscribe(&mut self, subject: &str) -> Result<SubscriptionId, EnvError> {
        let mut state = lock(&self.state);

        if state.reject_subscribe {
            state.stats.rejected_subscribes += 1;
            return Err(EnvError::BrokerRejected(format!(
                "Permissions Violation for Subscription to {subject}"
            )));
        }

        let sid = SubscriptionId(self.next_sid);
        let client = state
            .clients
            .get_mut(&self.id)
            .ok_or_else(|| EnvError::transport("connection closed"))?;
        client.subscriptions.insert(subject.to_string(), sid);
        self.next_sid += 1;
        Ok(sid)
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    async fn drain(&mut self) -> Result<(), EnvError> {
        lock(&self.state).clients.remove(&self.id);
        self.rx.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broker = SimBroker::new();
        let mut conn = broker.connector().connect("sim://broker").await.unwrap();
        let sid = conn.subscribe("students.locations").await.unwrap();

        assert_eq!(broker.publish("students.locations", b"a".to_vec()), 1);
        assert_eq!(broker.publish("other.topic", b"b".to_vec()), 0);

        let msg = conn.next_message().await.unwrap();
        assert_eq!(msg.sid, sid);
        assert_eq!(msg.payload, b"a");
        assert_eq!(broker.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_refused_connects() {
        let broker = SimBroker::new();
        broker.controller().refuse_next_connects(2);
        let connector = broker.connector();

        assert!(connector.connect("sim://broker").await.is_err());
        assert!(connector.connect("sim://broker").await.is_err());
        assert!(connector.connect("sim://broker").await.is_ok());
        assert_eq!(broker.stats().refused_connects, 2);
    }

    #[tokio::test]
    async fn test_offline_closes_streams() {
        let broker = SimBroker::new();
        let controller = broker.controller();
        let mut conn = broker.connector().connect("sim://broker").await.unwrap();
        conn.subscribe("t").await.unwrap();

        controller.go_offline();

        assert!(conn.next_message().await.is_none());
        assert!(broker.connector().connect("sim://broker").await.is_err());

        controller.go_online();
        assert!(broker.connector().connect("sim://broker").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_subscribe() {
        let broker = SimBroker::new();
        broker.controller().set_reject_subscribe(true);
        let mut conn = broker.connector().connect("sim://broker").await.unwrap();

        assert!(matches!(conn.subscribe("t").await, Err(EnvError::BrokerRejected(_))));
    }

    #[tokio::test]
    async fn test_drain_unregisters() {
        let broker = SimBroker::new();
        let controller = broker.controller();
        let mut conn = broker.connector().connect("sim://broker").await.unwrap();
        assert_eq!(controller.connection_count(), 1);

        conn.drain().await.unwrap();

        assert_eq!(controller.connection_count(), 0);
        assert!(conn.next_message().await.is_none());
    }
}
