//! Core environment context trait for the ArcView session.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// Abstracts the clock so the session loop can run against real time
/// (tokio) or a virtual clock (simulation).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
#[async_trait]
pub trait ArcViewContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used for frame pacing and connection retry deadlines.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// The session sleeps until the next frame deadline unless a message
    /// arrives first.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);
}
