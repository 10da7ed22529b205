//! ArcView Simulator CLI
//!
//! Runs the simulation scenarios, or a live session against a real NATS
//! WebSocket endpoint with `--broker`.

use anyhow::{bail, Context};
use arcview_core::{ArcViewConfig, ArcViewSession, ConnectionState};
use arcview_env::{NatsWsConnector, TokioContext};
use arcview_sim::scenarios::ScenarioId;
use arcview_sim::{ExportFrame, ScenarioResult, ScenarioRunner, SimExport};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Record every Nth frame when exporting (2 per second at 60 Hz)
const EXPORT_EVERY: u64 = 30;

/// ArcView simulation and live-session CLI
#[derive(Parser, Debug)]
#[command(name = "arcview-sim")]
#[command(
    about = "Run deterministic ArcView scenarios or a live broker session",
    long_about = None
)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady_stream, duplicate_flood, malformed_payloads, broker_outage, remount, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Run duration in seconds (virtual time for scenarios)
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Live mode: NATS WebSocket endpoint to subscribe to
    #[arg(short, long)]
    broker: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write map frames to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let mut config = match &args.config {
        Some(path) => ArcViewConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ArcViewConfig::default(),
    };
    config.apply_env();

    if let Some(url) = args.broker.clone() {
        return run_live(config, url, &args).await;
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
                bail!("{}. Available scenarios: {}, all", e, names.join(", "));
            }
        }
    };

    if args.export.is_some() && scenarios.len() > 1 {
        bail!("--export only supports a single scenario, not 'all'");
    }

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if !args.json {
        info!("ArcView Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let mut runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_config(config.clone());
        if args.export.is_some() {
            runner = runner.with_export(EXPORT_EVERY);
        }

        if !args.json {
            info!("▶ {}: {}", scenario.name(), scenario.description());
        }
        let result = runner.run(*scenario).await?;

        if !args.json {
            if result.passed {
                info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if let (Some(path), Some(export)) = (&args.export, &result.export) {
            export.write_to_file(path)?;
            info!("Exported {} frames to {}", export.frames.len(), path.display());
        }
        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", results.len());
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, results.len());
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs one real-time session against a live broker.
async fn run_live(mut config: ArcViewConfig, url: String, args: &Args) -> anyhow::Result<()> {
    config.broker_url = url;
    config.validate()?;
    info!("Live session against {} on topic {}", config.broker_url, config.topic);

    let ctx = TokioContext::shared();
    let mut session = ArcViewSession::new(ctx, NatsWsConnector::new(), config);
    session.mount().await;
    session.run_for(Duration::from_secs_f64(args.duration.max(0.0))).await;

    let state = session.connection_state();
    let frame = session.render();
    let stats = session.stats().clone();
    session.unmount().await;

    if let Some(path) = &args.export {
        let mut export = SimExport::new("live", args.seed);
        export.add_frame(ExportFrame {
            time_sec: args.duration,
            connection: state,
            map: frame,
            events: Vec::new(),
        });
        export.finalize(state == ConnectionState::Connected, stats.clone());
        export.write_to_file(path)?;
        info!("Exported final frame to {}", path.display());
    }

    if args.json {
        let summary = serde_json::json!({
            "mode": "live",
            "connection": state,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            "{} origins added, {} duplicates, {} bad payloads, {} frames ({:?})",
            stats.origins_added, stats.duplicates, stats.decode_failures, stats.frames, state
        );
    }
    Ok(())
}
