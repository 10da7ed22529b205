//! Runtime configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Precedence: defaults, then the JSON file, then environment,
//! then CLI flags (applied by the binary).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ArcViewError;
use crate::geodesy::{Coordinate, DEFAULT_STEPS};
use crate::listener::{RetryPolicy, DEFAULT_BROKER_URL, DEFAULT_TOPIC};
use crate::map_view::Viewport;
use crate::registry::DEFAULT_ORIGINS;

/// Environment variable holding the map service access token.
pub const MAPBOX_TOKEN_ENV: &str = "ARCVIEW_MAPBOX_TOKEN";

/// Basemap style.
pub const DEFAULT_MAP_STYLE: &str = "mapbox://styles/garvit2/cke5j2o2c1oej19qo843rhfi4";

/// Fixed arc destination (UIET, Chandigarh).
pub const DEFAULT_DESTINATION: Coordinate = Coordinate::new(76.7552951, 30.7481711);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcViewConfig {
    pub destination: Coordinate,
    pub steps: usize,
    pub origins: Vec<Coordinate>,

    pub broker_url: String,
    pub topic: String,
    pub retry: RetryPolicy,

    pub initial_viewport: Viewport,
    pub fly_to_zoom: f64,
    pub fly_to_speed: f64,

    pub map_style: String,

    /// Never written out with the rest of the config
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    pub frame_rate_hz: f64,

    /// Seed for pin colours
    pub color_seed: u64,
}

impl Default for ArcViewConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION,
            steps: DEFAULT_STEPS,
            origins: DEFAULT_ORIGINS.to_vec(),
            broker_url: DEFAULT_BROKER_URL.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            retry: RetryPolicy::default(),
            initial_viewport: Viewport::initial(),
            fly_to_zoom: 3.0,
            fly_to_speed: 1.0,
            map_style: DEFAULT_MAP_STYLE.to_string(),
            access_token: None,
            frame_rate_hz: 60.0,
            color_seed: 0,
        }
    }
}

impl ArcViewConfig {
    /// Loads a config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ArcViewError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!("loaded config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Picks up the access token from the environment, if set.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(MAPBOX_TOKEN_ENV) {
            if !token.is_empty() {
                self.access_token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ArcViewError> {
        if self.steps == 0 {
            return Err(ArcViewError::config("steps must be at least 1"));
        }
        if !(self.frame_rate_hz.is_finite() && self.frame_rate_hz > 0.0) {
            return Err(ArcViewError::config(format!(
                "frame_rate_hz must be positive, got {}",
                self.frame_rate_hz
            )));
        }
        if self.topic.is_empty() {
            return Err(ArcViewError::config("topic must not be empty"));
        }
        Ok(())
    }

    /// Time between display frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ArcViewConfig::default();

        assert_eq!(config.steps, 500);
        assert_eq!(config.origins.len(), 3);
        assert_eq!(config.topic, "students.locations");
        assert_eq!(config.fly_to_zoom, 3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_interval_60hz() {
        let config = ArcViewConfig::default();
        let interval = config.frame_interval();

        assert!(interval > Duration::from_millis(16));
        assert!(interval < Duration::from_millis(17));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ArcViewConfig =
            serde_json::from_str(r#"{"steps": 50, "destination": [10.0, 20.0]}"#).unwrap();

        assert_eq!(config.steps, 50);
        assert_eq!(config.destination, Coordinate::new(10.0, 20.0));
        assert_eq!(config.broker_url, DEFAULT_BROKER_URL);
    }

    #[test]
    fn test_token_not_serialized() {
        let config = ArcViewConfig {
            access_token: Some("secret".to_string()),
            ..ArcViewConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();

        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_from_json_file_rejects_zero_steps() {
        let path = std::env::temp_dir().join(format!("arcview_cfg_{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"steps": 0}"#).unwrap();

        let result = ArcViewConfig::from_json_file(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ArcViewError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = ArcViewConfig::from_json_file("/nonexistent/arcview.json");
        assert!(matches!(result, Err(ArcViewError::Io(_))));
    }
}
