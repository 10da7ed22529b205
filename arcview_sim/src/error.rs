//! Error types for the simulation harness.

use arcview_core::ArcViewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Bad configuration for the session under test
    #[error(transparent)]
    Config(#[from] ArcViewError),

    /// Writing an export failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid publisher distribution parameters
    #[error("Invalid distribution: {0}")]
    Distribution(String),
}
