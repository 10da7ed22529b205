//! ArcView Environment Abstraction Layer
//!
//! This crate isolates everything the arc engine needs from the outside
//! world so the same session code runs against a **live** broker (tokio +
//! WebSocket) and inside the **simulation** harness (virtual clock +
//! in-memory broker).
//!
//! # What is abstracted
//!
//! - Time: `now()`, `sleep()` (the display loop is a frame-rate sleep)
//! - Frames: `FrameScheduler`, one-shot next-frame requests
//! - Messaging: `BrokerConnector` / `BrokerConnection`
//!
//! # Example
//!
//! ```ignore
//! use arcview_env::{ArcViewContext, BrokerConnection};
//!
//! async fn viewer_loop<Ctx: ArcViewContext, Conn: BrokerConnection>(
//!     ctx: &Ctx,
//!     conn: &mut Conn,
//! ) {
//!     loop {
//!         tokio::select! {
//!             biased;
//!             msg = conn.next_message() => handle_message(msg),
//!             _ = ctx.sleep(Duration::from_millis(16)) => render_frame(),
//!         }
//!     }
//! }
//! ```

mod broker;
mod context;
mod error;
mod frame;
pub mod nats_codec;
mod nats_ws;
mod tokio_impl;
mod types;

pub use broker::{BrokerConnection, BrokerConnector};
pub use context::ArcViewContext;
pub use error::EnvError;
pub use frame::{FrameScheduler, FrameToken};
pub use nats_ws::{NatsWsConnection, NatsWsConnector};
pub use tokio_impl::TokioContext;
pub use types::{ConnectionId, InboundMessage, SubscriptionId};
