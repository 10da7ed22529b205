//! NATS client protocol codec.
//!
//! The NATS protocol is line oriented: every operation is a `\r\n`
//! terminated control line, and `MSG` is followed by a payload of the
//! announced size plus its own `\r\n`. Over WebSocket, frame boundaries do
//! not line up with operations, so `OpDecoder` buffers bytes and yields
//! complete operations only.
//!
//! Only the subset a subscribe-only client needs is implemented:
//!
//! | direction | ops                                           |
//! |-----------|-----------------------------------------------|
//! | server    | `INFO`, `MSG`, `PING`, `PONG`, `+OK`, `-ERR`  |
//! | client    | `CONNECT`, `SUB`, `UNSUB`, `PING`, `PONG`     |

use crate::error::EnvError;
use crate::types::SubscriptionId;
use serde::{Deserialize, Serialize};

const CRLF: &[u8] = b"\r\n";

/// Server `INFO` body. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub max_payload: u64,
    #[serde(default)]
    pub headers: bool,
}

/// Client `CONNECT` body.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectOptions {
    pub verbose: bool,
    pub pedantic: bool,
    pub lang: String,
    pub version: String,
    pub protocol: u8,
    pub headers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConnectOptions {
    /// Options for a quiet, header-less client.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            verbose: false,
            pedantic: false,
            lang: "rust".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: 1,
            headers: false,
            name: Some(name.into()),
        }
    }
}

/// An operation sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOp {
    Info(ServerInfo),
    Msg {
        subject: String,
        sid: SubscriptionId,
        reply_to: Option<String>,
        payload: Vec<u8>,
    },
    Ping,
    Pong,
    Ok,
    Err(String),
}

/// An operation sent by the client.
#[derive(Debug, Clone)]
pub enum ClientOp {
    Connect(ConnectOptions),
    Sub { subject: String, sid: SubscriptionId },
    Unsub { sid: SubscriptionId },
    Ping,
    Pong,
}

impl ClientOp {
    /// Encodes the operation as wire bytes, including the trailing CRLF.
    pub fn encode(&self) -> Result<Vec<u8>, EnvError> {
        let line = match self {
            ClientOp::Connect(opts) => {
                let body = serde_json::to_string(opts)
                    .map_err(|e| EnvError::protocol(format!("CONNECT body: {e}")))?;
                format!("CONNECT {body}\r\n")
            }
            ClientOp::Sub { subject, sid } => format!("SUB {subject} {sid}\r\n"),
            ClientOp::Unsub { sid } => format!("UNSUB {sid}\r\n"),
            ClientOp::Ping => "PING\r\n".to_string(),
            ClientOp::Pong => "PONG\r\n".to_string(),
        };
        Ok(line.into_bytes())
    }
}

/// Incremental decoder for server operations.
#[derive(Debug, Default)]
pub struct OpDecoder {
    buf: Vec<u8>,
}

impl OpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes received from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decodes the next complete operation.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A malformed control
    /// line is consumed before the error is returned so the stream can
    /// continue with the next operation.
    pub fn next_op(&mut self) -> Result<Option<ServerOp>, EnvError> {
        let Some(line_end) = find_crlf(&self.buf) else {
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&self.buf[..line_end]).into_owned();
        let body_start = line_end + CRLF.len();

        let (verb, rest) = match line.split_once(' ') {
            Some((v, r)) => (v, r.trim()),
            None => (line.trim(), ""),
        };

        let op = match verb.to_ascii_uppercase().as_str() {
            "MSG" => return self.decode_msg(rest, body_start),
            "INFO" => {
                self.consume(body_start);
                let info = serde_json::from_str(rest)
                    .map_err(|e| EnvError::protocol(format!("INFO body: {e}")))?;
                ServerOp::Info(info)
            }
            "PING" => ServerOp::Ping,
            "PONG" => ServerOp::Pong,
            "+OK" => ServerOp::Ok,
            "-ERR" => ServerOp::Err(rest.trim_matches('\'').to_string()),
            other => {
                self.consume(body_start);
                return Err(EnvError::protocol(format!("unknown operation '{other}'")));
            }
        };

        self.consume(body_start);
        Ok(Some(op))
    }

    fn decode_msg(&mut self, args: &str, body_start: usize) -> Result<Option<ServerOp>, EnvError> {
        let parts: Vec<&str> = args.split_whitespace().collect();
        let (subject, sid, reply_to, size) = match parts.as_slice() {
            [subject, sid, size] => (*subject, *sid, None, *size),
            [subject, sid, reply, size] => (*subject, *sid, Some(reply.to_string()), *size),
            _ => {
                self.consume(body_start);
                return Err(EnvError::protocol(format!("malformed MSG line '{args}'")));
            }
        };

        let (Ok(sid), Ok(size)) = (sid.parse::<u64>(), size.parse::<usize>()) else {
            self.consume(body_start);
            return Err(EnvError::protocol(format!("malformed MSG line '{args}'")));
        };

        let body_end = body_start + size;
        if self.buf.len() < body_end + CRLF.len() {
            return Ok(None);
        }
        if &self.buf[body_end..body_end + CRLF.len()] != CRLF {
            self.consume(body_end);
            return Err(EnvError::protocol("MSG payload not terminated by CRLF"));
        }

        let payload = self.buf[body_start..body_end].to_vec();
        let subject = subject.to_string();
        self.consume(body_end + CRLF.len());

        Ok(Some(ServerOp::Msg {
            subject,
            sid: SubscriptionId(sid),
            reply_to,
            payload,
        }))
    }

    fn consume(&mut self, n: usize) {
        self.buf.drain(..n.min(self.buf.len()));
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}
