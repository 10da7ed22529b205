//! Synthetic location publisher.
//!
//! Produces `{ "msg": { "latitude", "longitude" } }` payloads scattered
//! around a fixed set of cities, with configurable shares of exact
//! repeats and garbage payloads.

use arcview_core::Coordinate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;

use crate::error::SimError;

/// Cities the synthetic students report from.
pub const CITIES: [Coordinate; 8] = [
    Coordinate::new(77.1025, 28.7041),
    Coordinate::new(72.8777, 19.0760),
    Coordinate::new(88.3639, 22.5726),
    Coordinate::new(80.2707, 13.0827),
    Coordinate::new(77.5946, 12.9716),
    Coordinate::new(100.5018, 13.7563),
    Coordinate::new(103.8198, 1.3521),
    Coordinate::new(139.6503, 35.6762),
];

/// What kind of payload was produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadKind {
    /// A location not produced before
    Fresh(Coordinate),
    /// An exact repeat of an earlier location
    Duplicate(Coordinate),
    /// Not a location message
    Malformed,
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Standard deviation of the scatter around each city, in degrees
    pub spread_deg: f64,
    pub duplicate_rate: f64,
    pub malformed_rate: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            spread_deg: 0.5,
            duplicate_rate: 0.0,
            malformed_rate: 0.0,
        }
    }
}

pub struct LocationPublisher {
    rng: ChaCha8Rng,
    scatter: Normal<f64>,
    config: PublisherConfig,
    sent: Vec<Coordinate>,
}

impl LocationPublisher {
    pub fn new(seed: u64, config: PublisherConfig) -> Result<Self, SimError> {
        let scatter = Normal::new(0.0, config.spread_deg)
            .map_err(|e| SimError::Distribution(e.to_string()))?;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            scatter,
            config,
            sent: Vec::new(),
        })
    }

    /// Produces the next payload.
    pub fn next_payload(&mut self) -> (PayloadKind, Vec<u8>) {
        if self.rng.gen_bool(self.config.malformed_rate.clamp(0.0, 1.0)) {
            return (PayloadKind::Malformed, self.garbage());
        }

        if !self.sent.is_empty() && self.rng.gen_bool(self.config.duplicate_rate.clamp(0.0, 1.0)) {
            let index = self.rng.gen_range(0..self.sent.len());
            let repeat = self.sent[index];
            return (PayloadKind::Duplicate(repeat), encode(repeat));
        }

        let location = self.fresh_location();
        self.sent.push(location);
        (PayloadKind::Fresh(location), encode(location))
    }

    fn fresh_location(&mut self) -> Coordinate {
        let city = CITIES[self.rng.gen_range(0..CITIES.len())];
        let longitude = city.longitude + self.scatter.sample(&mut self.rng);
        let latitude = city.latitude + self.scatter.sample(&mut self.rng);
        let longitude = round4(longitude).clamp(-180.0, 180.0);
        let latitude = round4(latitude).clamp(-90.0, 90.0);
        Coordinate::new(longitude, latitude)
    }

    fn garbage(&mut self) -> Vec<u8> {
        match self.rng.gen_range(0..3) {
            0 => b"not json at all".to_vec(),
            1 => json!({ "latitude": 1.0, "longitude": 2.0 }).to_string().into_bytes(),
            _ => json!({ "msg": { "latitude": "north", "longitude": 2.0 } })
                .to_string()
                .into_bytes(),
        }
    }

    /// Locations produced so far, in order, repeats excluded.
    pub fn sent(&self) -> &[Coordinate] {
        &self.sent
    }
}

/// Encodes a location message.
pub fn encode(location: Coordinate) -> Vec<u8> {
    json!({ "msg": { "latitude": location.latitude, "longitude": location.longitude } })
        .to_string()
        .into_bytes()
}

fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}
