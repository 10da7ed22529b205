//! Scenario runner - drives a full session against the in-memory broker.
//!
//! Every run is deterministic for a given seed: the virtual clock only
//! moves on frame sleeps, the publisher and palette draw from seeds forked
//! off the context, and the broker delivers in publish order.

use crate::broker::SimBroker;
use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{ExportFrame, SimExport};
use crate::publisher::{LocationPublisher, PayloadKind, PublisherConfig};
use crate::scenarios::ScenarioId;

use arcview_core::registry::origin_key;
use arcview_core::{ArcViewConfig, ArcViewSession, ConnectionState, RetryPolicy, StepEvent};
use arcview_env::ArcViewContext;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Endpoint name used for the in-memory broker.
pub const SIM_BROKER_URL: &str = "sim://broker";

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Session steps executed
    pub total_steps: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Arcs on the map at the end
    pub final_arc_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Recorded frames, when export was requested
    #[serde(skip)]
    pub export: Option<SimExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Payloads published on the broker
    pub published: u64,

    /// Payloads that reached the session
    pub delivered: u64,

    pub origins_added: u64,
    pub duplicates: u64,
    pub decode_failures: u64,
    pub frames: u64,
    pub ticks: u64,
    pub connect_attempts: u64,
    pub connections_lost: u64,
    pub reconnects: u64,
}

/// What the session should have seen, counted from the publisher side.
#[derive(Debug, Default)]
struct Expectation {
    known_keys: HashSet<String>,
    new_origins: u64,
    duplicates: u64,
    malformed: u64,
}

impl Expectation {
    fn seeded(config: &ArcViewConfig) -> Self {
        Self {
            known_keys: config.origins.iter().map(|c| origin_key(*c)).collect(),
            ..Self::default()
        }
    }

    fn record(&mut self, kind: PayloadKind) {
        match kind {
            PayloadKind::Fresh(c) | PayloadKind::Duplicate(c) => {
                if self.known_keys.insert(origin_key(c)) {
                    self.new_origins += 1;
                } else {
                    self.duplicates += 1;
                }
            }
            PayloadKind::Malformed => self.malformed += 1,
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Time between published payloads
    publish_interval: Duration,

    /// Record every Nth frame
    export_every: Option<u64>,

    /// Session configuration before scenario overrides
    base_config: ArcViewConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 10.0,
            publish_interval: Duration::from_millis(250),
            export_every: None,
            base_config: ArcViewConfig::default(),
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_config(mut self, config: ArcViewConfig) -> Self {
        self.base_config = config;
        self
    }

    /// Records every `every`-th frame into the result's export.
    pub fn with_export(mut self, every: u64) -> Self {
        self.export_every = Some(every.max(1));
        self
    }

    fn publisher_config(scenario: ScenarioId) -> PublisherConfig {
        match scenario {
            ScenarioId::DuplicateFlood => PublisherConfig {
                duplicate_rate: 0.8,
                ..PublisherConfig::default()
            },
            ScenarioId::MalformedPayloads => PublisherConfig {
                malformed_rate: 0.3,
                ..PublisherConfig::default()
            },
            _ => PublisherConfig::default(),
        }
    }

    fn session_config(
        &self,
        scenario: ScenarioId,
        ctx: &SimContext,
    ) -> Result<ArcViewConfig, SimError> {
        let mut config = self.base_config.clone();
        config.broker_url = SIM_BROKER_URL.to_string();
        config.color_seed = ctx.fork_seed();
        if scenario == ScenarioId::BrokerOutage {
            config.retry = RetryPolicy {
                max_attempts: 10,
                max_backoff_ms: 2_000,
                ..RetryPolicy::default()
            };
        }
        config.validate()?;
        Ok(config)
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let ctx = SimContext::shared(self.seed);
        let broker = SimBroker::new();
        let controller = broker.controller();
        let config = self.session_config(scenario, &ctx)?;
        let topic = config.topic.clone();
        let mut expect = Expectation::seeded(&config);
        let mut publisher =
            LocationPublisher::new(ctx.fork_seed(), Self::publisher_config(scenario))?;
        let mut session = ArcViewSession::new(ctx.clone(), broker.connector(), config);
        let mut export = self.export_every.map(|_| SimExport::new(scenario.name(), self.seed));

        let duration = Duration::from_secs_f64(self.max_duration_secs.max(0.0));
        let outage_start = duration / 3;
        let outage_end = (outage_start + Duration::from_secs(3)).min(duration * 2 / 3);
        let mut outage_started = false;
        let mut outage_over = false;
        let mut remounted = false;

        let mut failures: Vec<String> = Vec::new();
        let mut events: Vec<String> = Vec::new();
        let mut metrics = ScenarioMetrics::default();
        let mut next_publish = self.publish_interval;

        session.mount().await;

        while ctx.now() < duration {
            let now = ctx.now();

            match scenario {
                ScenarioId::BrokerOutage if !outage_started && now >= outage_start => {
                    outage_started = true;
                    controller.go_offline();
                    events.push("broker offline".to_string());
                }
                ScenarioId::BrokerOutage if outage_started && !outage_over && now >= outage_end => {
                    outage_over = true;
                    controller.go_online();
                    events.push("broker online".to_string());
                }
                ScenarioId::Remount if !remounted && now >= duration / 2 => {
                    remounted = true;
                    session.unmount().await;
                    if session.pending_frames() != 0 {
                        failures.push(format!(
                            "{} frames still pending after unmount",
                            session.pending_frames()
                        ));
                    }
                    if session.view().arcs().iter().any(|a| a.animator().position() != a.origin()) {
                        failures.push("marker not reset to origin on unmount".to_string());
                    }
                    if session.connection_state() != ConnectionState::Disconnected {
                        failures.push(format!(
                            "connection {:?} after unmount",
                            session.connection_state()
                        ));
                    }
                    session.mount().await;
                    if session.pending_frames() != session.view().arcs().len() {
                        failures.push("arcs did not restart on remount".to_string());
                    }
                    events.push("remounted".to_string());
                }
                _ => {}
            }

            if now >= next_publish {
                next_publish += self.publish_interval;
                let (kind, payload) = publisher.next_payload();
                metrics.published += 1;
                if broker.publish(&topic, payload) > 0 {
                    metrics.delivered += 1;
                    expect.record(kind);
                }
            }

            match session.step().await {
                StepEvent::Frame(report) => {
                    if let (Some(export), Some(every)) = (export.as_mut(), self.export_every) {
                        if report.frame % every == 0 {
                            export.add_frame(ExportFrame {
                                time_sec: ctx.now().as_secs_f64(),
                                connection: session.connection_state(),
                                map: session.render(),
                                events: std::mem::take(&mut events),
                            });
                        }
                    }
                }
                StepEvent::OriginAdded { key } => events.push(format!("origin {key}")),
                StepEvent::ConnectionLost => events.push("connection lost".to_string()),
                StepEvent::Duplicate { .. } | StepEvent::DecodeFailed => {}
            }
        }

        let stats = session.stats().clone();
        let listener_stats = session.listener().stats().clone();
        metrics.origins_added = stats.origins_added;
        metrics.duplicates = stats.duplicates;
        metrics.decode_failures = stats.decode_failures;
        metrics.frames = stats.frames;
        metrics.ticks = stats.ticks;
        metrics.connections_lost = stats.connections_lost;
        metrics.reconnects = stats.reconnects;
        metrics.connect_attempts = listener_stats.connect_attempts;

        let seeds = session.config().origins.len() as u64;
        let registry_len = session.registry().len() as u64;
        if registry_len != seeds + expect.new_origins {
            failures.push(format!(
                "registry has {} origins, expected {}",
                registry_len,
                seeds + expect.new_origins
            ));
        }
        if stats.duplicates != expect.duplicates {
            failures.push(format!(
                "{} duplicates seen, expected {}",
                stats.duplicates, expect.duplicates
            ));
        }
        if stats.decode_failures != expect.malformed {
            failures.push(format!(
                "{} decode failures, expected {}",
                stats.decode_failures, expect.malformed
            ));
        }
        if session.view().arcs().len() != session.registry().len() {
            failures.push("arc count does not match registry".to_string());
        }

        let connected = session.connection_state() == ConnectionState::Connected;
        match scenario {
            ScenarioId::SteadyStream if expect.new_origins == 0 => {
                failures.push("no new origins were delivered".to_string());
            }
            ScenarioId::DuplicateFlood if stats.duplicates == 0 => {
                failures.push("no duplicates were delivered".to_string());
            }
            ScenarioId::MalformedPayloads if stats.decode_failures == 0 => {
                failures.push("no malformed payloads were delivered".to_string());
            }
            ScenarioId::BrokerOutage => {
                if stats.connections_lost == 0 {
                    failures.push("outage did not close the connection".to_string());
                }
                if !outage_over {
                    failures.push("run ended before the broker came back".to_string());
                }
            }
            ScenarioId::Remount if !remounted => {
                failures.push("run ended before the remount".to_string());
            }
            _ => {}
        }
        if !connected {
            failures.push(format!("ended {:?}, not connected", session.connection_state()));
        }

        session.unmount().await;

        let passed = failures.is_empty();
        if !passed {
            warn!("{} failed: {}", scenario.name(), failures.join("; "));
        }
        debug!(
            "{}: {} published, {} delivered, {} arcs",
            scenario.name(),
            metrics.published,
            metrics.delivered,
            session.view().arcs().len()
        );

        if let Some(export) = export.as_mut() {
            export.finalize(passed, stats.clone());
        }

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_steps: stats.steps,
            final_time_secs: ctx.now().as_secs_f64(),
            final_arc_count: session.view().arcs().len(),
            failure_reason: if passed { None } else { Some(failures.join("; ")) },
            metrics,
            export,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(seed: u64) -> ScenarioRunner {
        let config = ArcViewConfig {
            steps: 60,
            ..ArcViewConfig::default()
        };
        ScenarioRunner::new(seed).with_duration(10.0).with_config(config)
    }

    #[tokio::test]
    async fn test_steady_stream_scenario() {
        let result = runner(42).run(ScenarioId::SteadyStream).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.final_arc_count > 3);
        assert_eq!(result.metrics.decode_failures, 0);
    }

    #[tokio::test]
    async fn test_duplicate_flood_scenario() {
        let result = runner(7).run(ScenarioId::DuplicateFlood).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.duplicates > 0);
        assert_eq!(result.final_arc_count as u64, 3 + result.metrics.origins_added);
    }

    #[tokio::test]
    async fn test_malformed_payloads_scenario() {
        let result = runner(11).run(ScenarioId::MalformedPayloads).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.decode_failures > 0);
    }

    #[tokio::test]
    async fn test_broker_outage_scenario() {
        let result = runner(3).run(ScenarioId::BrokerOutage).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.connections_lost >= 1);
        assert!(result.metrics.reconnects >= 1);
        assert!(result.metrics.published > result.metrics.delivered);
    }

    #[tokio::test]
    async fn test_remount_scenario() {
        let result = runner(5).run(ScenarioId::Remount).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[tokio::test]
    async fn test_same_seed_is_deterministic() {
        let a = runner(99).run(ScenarioId::DuplicateFlood).await.unwrap();
        let b = runner(99).run(ScenarioId::DuplicateFlood).await.unwrap();

        assert_eq!(a.total_steps, b.total_steps);
        assert_eq!(a.final_arc_count, b.final_arc_count);
        assert_eq!(a.metrics.duplicates, b.metrics.duplicates);
    }

    #[tokio::test]
    async fn test_export_records_frames() {
        let result = runner(1).with_export(30).run(ScenarioId::SteadyStream).await.unwrap();

        let export = result.export.unwrap();
        assert!(!export.frames.is_empty());
        assert!(export.passed);
        assert!(export.frames.last().unwrap().map.arcs.len() > 3);
    }
}
