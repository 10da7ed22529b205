//! JSON exporter for map frames.
//!
//! Exports a run as a sequence of `MapFrame`s so a map front end can
//! replay it.

use arcview_core::{ConnectionState, MapFrame, SessionStats};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::SimError;

/// A single exported frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub connection: ConnectionState,

    pub map: MapFrame,

    /// Events since the previous exported frame
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    pub scenario: String,
    pub seed: u64,
    pub duration_sec: f64,
    pub frames: Vec<ExportFrame>,
    pub passed: bool,

    #[serde(skip_deserializing)]
    pub stats: Option<SessionStats>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            stats: None,
        }
    }

    pub fn add_frame(&mut self, frame: ExportFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, stats: SessionStats) {
        self.passed = passed;
        self.stats = Some(stats);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcview_core::{ArcViewConfig, MapView};

    #[test]
    fn test_export_roundtrips_through_file() {
        let view = MapView::new(&ArcViewConfig::default());
        let mut export = SimExport::new("steady_stream", 42);
        export.add_frame(ExportFrame {
            time_sec: 1.5,
            connection: ConnectionState::Connected,
            map: view.render(),
            events: vec!["origin 1020".to_string()],
        });
        export.finalize(true, SessionStats::default());

        let path = std::env::temp_dir().join(format!("arcview_export_{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let back: SimExport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.frames.len(), 1);
        assert_eq!(back.duration_sec, 1.5);
        assert_eq!(back.frames[0].connection, ConnectionState::Connected);
        assert!(back.passed);
    }
}
