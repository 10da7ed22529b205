//! Production broker transport: NATS over WebSocket.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::broker::{BrokerConnection, BrokerConnector};
use crate::error::EnvError;
use crate::nats_codec::{ClientOp, ConnectOptions, OpDecoder, ServerInfo, ServerOp};
use crate::types::{ConnectionId, InboundMessage, SubscriptionId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a NATS server's WebSocket listener.
#[derive(Debug, Clone)]
pub struct NatsWsConnector {
    /// Prefix for the client name announced in `CONNECT`
    client_name: String,
}

impl NatsWsConnector {
    /// Creates a connector announcing itself as `arcview`.
    pub fn new() -> Self {
        Self {
            client_name: "arcview".to_string(),
        }
    }
}

impl Default for NatsWsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for NatsWsConnector {
    type Connection = NatsWsConnection;

    async fn connect(&self, endpoint: &str) -> Result<NatsWsConnection, EnvError> {
        let (ws, _response) = connect_async(endpoint)
            .await
            .map_err(|e| EnvError::connection(format!("{endpoint}: {e}")))?;

        let id = ConnectionId::new();
        let mut conn = NatsWsConnection {
            id,
            ws,
            decoder: OpDecoder::new(),
            inbox: VecDeque::new(),
            subscriptions: Vec::new(),
            next_sid: 1,
            server_info: None,
            closed: false,
        };

        conn.handshake(format!("{}-{}", self.client_name, id)).await?;
        info!(
            "connected to {} (server {}, conn {})",
            endpoint,
            conn.server_info.as_ref().map(|i| i.version.as_str()).unwrap_or("?"),
            id
        );
        Ok(conn)
    }
}

/// An open NATS connection over WebSocket.
pub struct NatsWsConnection {
    id: ConnectionId,
    ws: WsStream,
    decoder: OpDecoder,

    /// Messages decoded but not yet handed out
    inbox: VecDeque<InboundMessage>,

    /// Active subscriptions, unsubscribed on drain
    subscriptions: Vec<SubscriptionId>,
    next_sid: u64,
    server_info: Option<ServerInfo>,
    closed: bool,
}

impl NatsWsConnection {
    async fn send_op(&mut self, op: ClientOp) -> Result<(), EnvError> {
        let bytes = op.encode()?;
        self.ws.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    /// Waits for `INFO`, sends `CONNECT` + `PING`, waits for `PONG`.
    async fn handshake(&mut self, name: String) -> Result<(), EnvError> {
        while self.server_info.is_none() {
            match self.read_op().await? {
                Some(ServerOp::Info(info)) => self.server_info = Some(info),
                Some(ServerOp::Err(e)) => return Err(EnvError::BrokerRejected(e)),
                Some(_) => {}
                None => return Err(EnvError::connection("closed before INFO")),
            }
        }

        self.send_op(ClientOp::Connect(ConnectOptions::new(name))).await?;
        self.send_op(ClientOp::Ping).await?;

        loop {
            match self.read_op().await? {
                Some(ServerOp::Pong) => return Ok(()),
                Some(ServerOp::Ping) => self.send_op(ClientOp::Pong).await?,
                Some(ServerOp::Err(e)) => return Err(EnvError::BrokerRejected(e)),
                Some(_) => {}
                None => return Err(EnvError::connection("closed during CONNECT")),
            }
        }
    }

    /// Reads until one complete server operation is available.
    ///
    /// Returns `Ok(None)` once the socket is closed.
    async fn read_op(&mut self) -> Result<Option<ServerOp>, EnvError> {
        loop {
            if let Some(op) = self.decoder.next_op()? {
                return Ok(Some(op));
            }

            match self.ws.next().await {
                Some(Ok(Message::Binary(bytes))) => self.decoder.push(&bytes),
                Some(Ok(Message::Text(text))) => self.decoder.push(text.as_bytes()),
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl BrokerConnection for NatsWsConnection {
    async fn subscribe(&mut self, subject: &str) -> Result<SubscriptionId, EnvError> {
        if self.closed {
            return Err(EnvError::transport("connection closed"));
        }
        let sid = SubscriptionId(self.next_sid);
        self.next_sid += 1;

        self.send_op(ClientOp::Sub {
            subject: subject.to_string(),
            sid,
        })
        .await?;
        self.subscriptions.push(sid);
        debug!("conn {} subscribed to {} (sid {})", self.id, subject, sid);
        Ok(sid)
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        loop {
            if let Some(msg) = self.inbox.pop_front() {
                return Some(msg);
            }
            if self.closed {
                return None;
            }

            match self.read_op().await {
                Ok(Some(ServerOp::Msg { subject, sid, reply_to, payload })) => {
                    self.inbox.push_back(InboundMessage {
                        subject,
                        sid,
                        reply_to,
                        payload,
                    });
                }
                Ok(Some(ServerOp::Ping)) => {
                    if let Err(e) = self.send_op(ClientOp::Pong).await {
                        warn!("conn {} failed to answer PING: {}", self.id, e);
                    }
                }
                Ok(Some(ServerOp::Err(e))) => warn!("conn {} server error: {}", self.id, e),
                Ok(Some(_)) => {}
                Ok(None) => return None,
                Err(EnvError::ProtocolError(e)) => warn!("conn {} skipped bad op: {}", self.id, e),
                Err(e) => {
                    warn!("conn {} read failed: {}", self.id, e);
                    return None;
                }
            }
        }
    }

    async fn drain(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Ok(());
        }
        for sid in std::mem::take(&mut self.subscriptions) {
            self.send_op(ClientOp::Unsub { sid }).await?;
        }
        self.closed = true;
        self.ws.close(None).await?;
        info!("conn {} drained", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::accept_async;

    type ServerWs = WebSocketStream<TcpStream>;

    const INFO: &str = concat!(
        "INFO {\"server_id\":\"NTEST\",\"version\":\"2.10.7\",",
        "\"max_payload\":1048576}\r\n"
    );

    /// Accepts one WebSocket client on a loopback port and plays `script`.
    async fn serve<F, Fut>(script: F) -> (String, JoinHandle<()>)
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = accept_async(tcp).await.unwrap();
            script(ws).await;
        });
        (format!("ws://{addr}"), handle)
    }

    async fn send(ws: &mut ServerWs, text: &str) {
        ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// Next client frame as text, empty once the client has gone.
    async fn recv(ws: &mut ServerWs) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(bytes))) => return String::from_utf8(bytes).unwrap(),
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return String::new(),
                Some(Ok(_)) => {}
            }
        }
    }

    /// Server half of the handshake; returns the client's CONNECT line.
    async fn greet(ws: &mut ServerWs) -> String {
        send(ws, INFO).await;
        let connect = recv(ws).await;
        assert_eq!(recv(ws).await, "PING\r\n");
        send(ws, "PONG\r\n").await;
        connect
    }

    #[tokio::test]
    async fn test_handshake_subscribe_and_deliver() {
        let (url, server) = serve(|mut ws| async move {
            let connect = greet(&mut ws).await;
            assert!(connect.starts_with("CONNECT {"));
            assert!(connect.contains("\"name\":\"arcview-"));
            assert!(connect.ends_with("}\r\n"));

            assert_eq!(recv(&mut ws).await, "SUB students.locations 1\r\n");

            // keepalive before the first message must be answered
            send(&mut ws, "PING\r\n").await;
            assert_eq!(recv(&mut ws).await, "PONG\r\n");

            send(&mut ws, "MSG students.locations 1 5\r\nhello\r\n").await;
            assert_eq!(recv(&mut ws).await, "UNSUB 1\r\n");

            // close frame
            assert_eq!(recv(&mut ws).await, "");
        })
        .await;

        let mut conn = NatsWsConnector::new().connect(&url).await.unwrap();
        assert_eq!(conn.server_info.as_ref().map(|i| i.version.as_str()), Some("2.10.7"));

        let sid = conn.subscribe("students.locations").await.unwrap();
        assert_eq!(sid, SubscriptionId(1));

        let msg = conn.next_message().await.unwrap();
        assert_eq!(msg.subject, "students.locations");
        assert_eq!(msg.sid, sid);
        assert_eq!(msg.reply_to, None);
        assert_eq!(msg.payload, b"hello");

        conn.drain().await.unwrap();
        assert!(conn.subscribe("students.locations").await.is_err());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_err_during_handshake_is_rejection() {
        let (url, server) = serve(|mut ws| async move {
            send(&mut ws, INFO).await;
            recv(&mut ws).await;
            recv(&mut ws).await;
            send(&mut ws, "-ERR 'Authorization Violation'\r\n").await;
        })
        .await;

        let result = NatsWsConnector::new().connect(&url).await;

        match result {
            Err(EnvError::BrokerRejected(reason)) => assert_eq!(reason, "Authorization Violation"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("connect should have been rejected"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_ends_message_stream() {
        let (url, server) = serve(|mut ws| async move {
            greet(&mut ws).await;
            let _ = ws.close(None).await;
        })
        .await;

        let mut conn = NatsWsConnector::new().connect(&url).await.unwrap();

        assert!(conn.next_message().await.is_none());
        assert!(matches!(
            conn.subscribe("students.locations").await,
            Err(EnvError::TransportError(_))
        ));
        assert!(conn.drain().await.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_operation_is_skipped() {
        let (url, server) = serve(|mut ws| async move {
            greet(&mut ws).await;
            recv(&mut ws).await;
            send(&mut ws, "BOGUS 1 2\r\n").await;
            send(&mut ws, "MSG students.locations 1 2\r\nok\r\n").await;
            assert_eq!(recv(&mut ws).await, "UNSUB 1\r\n");
            recv(&mut ws).await;
        })
        .await;

        let mut conn = NatsWsConnector::new().connect(&url).await.unwrap();
        conn.subscribe("students.locations").await.unwrap();

        let msg = conn.next_message().await.unwrap();
        assert_eq!(msg.payload, b"ok");
        conn.drain().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = NatsWsConnector::new().connect(&format!("ws://{addr}")).await;

        assert!(matches!(result, Err(EnvError::ConnectionError(_))));
    }
}
