//! The viewer session loop.
//!
//! One session is one mounted map view plus its broker connection. The
//! loop is single-threaded and cooperative: each `step()` wakes up for
//! exactly one thing, either a broker message (preferred when one is
//! ready) or a display frame. An overdue frame skips the select entirely.
//!
//! ```text
//!        ┌───────────── step() ─────────────┐
//!        │  select! (biased)                │
//!        │   ├─ listener.next_message() ────┼──► decode ─► registry ─► view.sync()
//!        │   └─ ctx.sleep(to next frame) ───┼──► view.on_frame() ─► due retry?
//!        └──────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use arcview_env::{ArcViewContext, BrokerConnector, FrameScheduler, InboundMessage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::animator::ArcId;
use crate::config::ArcViewConfig;
use crate::error::ListenerError;
use crate::geodesy::Coordinate;
use crate::listener::{ConnectionState, OriginListener};
use crate::map_view::{FrameReport, MapFrame, MapView};
use crate::registry::{origin_key, OriginRegistry};

/// What a single `step()` handled.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// A new origin was registered and its arc created
    OriginAdded { key: String },

    /// The origin was already known
    Duplicate { key: String },

    /// The message payload was not a location
    DecodeFailed,

    /// The broker closed the stream
    ConnectionLost,

    /// A display frame was dispatched
    Frame(FrameReport),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub steps: u64,
    pub frames: u64,
    pub ticks: u64,
    pub origins_added: u64,
    pub duplicates: u64,
    pub decode_failures: u64,
    pub connections_lost: u64,
    pub reconnects: u64,
}

/// A map view wired to a location broker.
pub struct ArcViewSession<Ctx: ArcViewContext, C: BrokerConnector> {
    ctx: Arc<Ctx>,
    config: ArcViewConfig,
    registry: OriginRegistry,
    view: MapView,
    frames: FrameScheduler<ArcId>,
    listener: OriginListener<C>,

    /// Context time at which the next automatic connect is due
    retry_at: Option<Duration>,

    /// Context time at which the next display frame is due
    next_frame_at: Duration,
    stats: SessionStats,
}

impl<Ctx: ArcViewContext, C: BrokerConnector> ArcViewSession<Ctx, C> {
    pub fn new(ctx: Arc<Ctx>, connector: C, config: ArcViewConfig) -> Self {
        let listener = OriginListener::new(
            connector,
            config.broker_url.clone(),
            config.topic.clone(),
            config.retry.clone(),
        );
        Self {
            registry: OriginRegistry::seeded(config.origins.iter().copied()),
            view: MapView::new(&config),
            frames: FrameScheduler::new(),
            listener,
            retry_at: None,
            next_frame_at: ctx.now() + config.frame_interval(),
            stats: SessionStats::default(),
            ctx,
            config,
        }
    }

    /// Mounts the view, starts every arc and makes the first connection
    /// attempt.
    ///
    /// A failed attempt is not an error for the session; it is logged and
    /// retried per the retry policy.
    pub async fn mount(&mut self) {
        self.view.sync(&self.registry, &mut self.frames);
        self.view.mount(&mut self.frames);
        self.next_frame_at = self.ctx.now() + self.config.frame_interval();
        let _ = self.try_connect().await;
    }

    /// Connects and subscribes once.
    pub async fn try_connect(&mut self) -> Result<(), ListenerError> {
        self.retry_at = None;
        let result = self.connect_and_subscribe().await;
        if result.is_err() {
            self.retry_at = self.listener.next_retry_delay().map(|d| self.ctx.now() + d);
            match self.retry_at {
                Some(at) => debug!("next connection attempt at {:?}", at),
                None => warn!("giving up on {} until a manual reconnect", self.listener.endpoint()),
            }
        }
        result
    }

    async fn connect_and_subscribe(&mut self) -> Result<(), ListenerError> {
        self.listener.connect().await?;
        if self.listener.subscription().is_none() {
            self.listener.subscribe().await?;
        }
        Ok(())
    }

    /// Manual reconnect: clears the retry budget and tries again.
    pub async fn reconnect(&mut self) -> Result<(), ListenerError> {
        self.listener.reset_retries();
        self.try_connect().await
    }

    /// Handles one wake-up.
    ///
    /// A frame whose deadline has passed runs before any queued message,
    /// so a busy broker cannot starve the animation.
    pub async fn step(&mut self) -> StepEvent {
        self.stats.steps += 1;

        let now = self.ctx.now();
        if now < self.next_frame_at {
            let wait = self.next_frame_at - now;
            let inbound = tokio::select! {
                biased;
                msg = self.listener.next_message() => Some(msg),
                _ = self.ctx.sleep(wait) => None,
            };

            match inbound {
                Some(Some(msg)) => return self.on_message(&msg),
                Some(None) => return self.on_connection_lost(),
                None => {}
            }
        }
        self.on_frame().await
    }

    /// Steps until `duration` of context time has passed.
    pub async fn run_for(&mut self, duration: Duration) -> &SessionStats {
        let deadline = self.ctx.now() + duration;
        while self.ctx.now() < deadline {
            self.step().await;
        }
        &self.stats
    }

    fn on_message(&mut self, msg: &InboundMessage) -> StepEvent {
        match self.listener.handle_payload(&msg.payload) {
            Ok(coordinate) => self.add_origin(coordinate),
            Err(_) => {
                self.stats.decode_failures += 1;
                StepEvent::DecodeFailed
            }
        }
    }

    /// Registers an origin and creates its arc if it is new.
    pub fn add_origin(&mut self, coordinate: Coordinate) -> StepEvent {
        let key = origin_key(coordinate);
        if self.registry.add_origin(coordinate) {
            self.view.sync(&self.registry, &mut self.frames);
            self.stats.origins_added += 1;
            info!("new origin {} ({} arcs)", key, self.registry.len());
            StepEvent::OriginAdded { key }
        } else {
            self.stats.duplicates += 1;
            debug!("duplicate origin {}", key);
            StepEvent::Duplicate { key }
        }
    }

    fn on_connection_lost(&mut self) -> StepEvent {
        self.stats.connections_lost += 1;
        self.retry_at = self.listener.policy().delay_after_loss().map(|d| self.ctx.now() + d);
        StepEvent::ConnectionLost
    }

    async fn on_frame(&mut self) -> StepEvent {
        let now = self.ctx.now();
        let interval = self.config.frame_interval();
        self.next_frame_at += interval;
        if self.next_frame_at <= now {
            // fell behind; skip the missed frames instead of bursting
            self.next_frame_at = now + interval;
        }

        let report = self.view.on_frame(&mut self.frames);
        self.stats.frames += 1;
        self.stats.ticks += report.ticked as u64;

        if let Some(at) = self.retry_at {
            if self.ctx.now() >= at {
                self.stats.reconnects += 1;
                let _ = self.try_connect().await;
            }
        }
        StepEvent::Frame(report)
    }

    /// Cancels all frames, resets markers and drains the connection.
    pub async fn unmount(&mut self) {
        self.view.unmount(&mut self.frames);
        self.retry_at = None;
        self.listener.drain().await;
    }

    pub fn render(&self) -> MapFrame {
        self.view.render()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.listener.state()
    }

    pub fn registry(&self) -> &OriginRegistry {
        &self.registry
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut MapView {
        &mut self.view
    }

    pub fn listener(&self) -> &OriginListener<C> {
        &self.listener
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.pending()
    }

    pub fn retry_at(&self) -> Option<Duration> {
        self.retry_at
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn config(&self) -> &ArcViewConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.ctx
    }
}
