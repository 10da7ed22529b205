//! ArcView Deterministic Simulation Harness
//!
//! Runs the real `ArcViewSession` against a virtual clock and an in-memory
//! broker, so connection faults, bad payloads and remounts can be replayed
//! exactly from a seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │                                                          │
//! │  LocationPublisher ──publish──► SimBroker ◄── Controller │
//! │                                    │        (faults)     │
//! │                                    ▼                     │
//! │  SimContext ◄──sleep/now──── ArcViewSession ──► SimExport│
//! │  (virtual clock)                                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use arcview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(10.0)
//!     .run(ScenarioId::BrokerOutage)
//!     .await?;
//! assert!(result.passed);
//! ```

mod broker;
mod context;
mod error;
mod exporter;
mod publisher;
mod runner;
pub mod scenarios;

pub use broker::{
    BrokerStats, SimBroker, SimBrokerConnection, SimBrokerConnector, SimBrokerController,
};
pub use context::SimContext;
pub use error::SimError;
pub use exporter::{ExportFrame, SimExport};
pub use publisher::{LocationPublisher, PayloadKind, PublisherConfig};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SIM_BROKER_URL};
