//! Great-circle path building.
//!
//! A route is sampled at `distance / steps` intervals along the great
//! circle from the origin toward the destination, using the haversine
//! model (mean earth radius). The result always starts with the origin.
//! It ends with the exact destination unless the two points coincide, in
//! which case the path is the single origin point.

use geo::{HaversineBearing, HaversineDestination, HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// Default number of sampling intervals per route.
pub const DEFAULT_STEPS: usize = 500;

/// A longitude/latitude pair in degrees.
///
/// Serialized as a GeoJSON position, `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        Self { longitude, latitude }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.longitude, c.latitude]
    }
}

impl From<Point<f64>> for Coordinate {
    fn from(p: Point<f64>) -> Self {
        Self::new(p.x(), p.y())
    }
}

/// An immutable, ordered sequence of coordinates along a great circle.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicPath {
    points: Vec<Coordinate>,
}

impl GeodesicPath {
    /// Wraps an explicit list of points.
    ///
    /// Used for hand-built paths; `build_path` is the normal constructor.
    /// An empty list is replaced by a single `(0, 0)` point so the path
    /// always has an origin.
    pub fn from_points(points: Vec<Coordinate>) -> Self {
        if points.is_empty() {
            return Self {
                points: vec![Coordinate::new(0.0, 0.0)],
            };
        }
        Self { points }
    }

    /// First point of the path.
    pub fn origin(&self) -> Coordinate {
        self.points[0]
    }

    /// Last point of the path.
    pub fn end(&self) -> Coordinate {
        self.points[self.points.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<Coordinate> {
        self.points.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; kept for the `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }
}

/// Great-circle distance in meters.
pub fn distance_m(from: Coordinate, to: Coordinate) -> f64 {
    from.to_point().haversine_distance(&to.to_point())
}

/// Initial great-circle bearing from `from` to `to`, in degrees.
pub fn bearing(from: Coordinate, to: Coordinate) -> f64 {
    from.to_point().haversine_bearing(to.to_point())
}

/// Builds the sampled great-circle path from `origin` to `destination`.
///
/// Produces `steps + 1` points: the origin, `steps - 1` intermediate
/// samples at equal arc length, and the exact destination. Identical or
/// non-separable endpoints yield `[origin]`. `steps` is clamped to >= 1.
pub fn build_path(origin: Coordinate, destination: Coordinate, steps: usize) -> GeodesicPath {
    let steps = steps.max(1);
    let distance = distance_m(origin, destination);

    if distance.is_nan() || distance <= 0.0 {
        return GeodesicPath {
            points: vec![origin],
        };
    }

    let start = origin.to_point();
    let heading = bearing(origin, destination);
    let interval = distance / steps as f64;

    let mut points = Vec::with_capacity(steps + 1);
    points.push(origin);
    for k in 1..steps {
        let sample = start.haversine_destination(heading, interval * k as f64);
        points.push(sample.into());
    }
    points.push(destination);

    GeodesicPath { points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const SEOUL: Coordinate = Coordinate::new(126.8494654, 37.5650172);
    const UIET: Coordinate = Coordinate::new(76.7552951, 30.7481711);

    #[test]
    fn test_path_has_steps_plus_one_points() {
        let path = build_path(SEOUL, UIET, DEFAULT_STEPS);

        assert_eq!(path.len(), DEFAULT_STEPS + 1);
        assert_eq!(path.origin(), SEOUL);
        assert_eq!(path.end(), UIET);
    }

    #[test]
    fn test_samples_are_evenly_spaced() {
        let steps = 50;
        let path = build_path(SEOUL, UIET, steps);
        let expected = distance_m(SEOUL, UIET) / steps as f64;

        for pair in path.points().windows(2) {
            assert_relative_eq!(distance_m(pair[0], pair[1]), expected, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_samples_lie_on_the_great_circle() {
        let path = build_path(SEOUL, UIET, 20);
        let total = distance_m(SEOUL, UIET);

        // On the great circle, origin->p->destination adds up to the full arc
        for p in path.points() {
            assert_relative_eq!(
                distance_m(SEOUL, *p) + distance_m(*p, UIET),
                total,
                max_relative = 1e-6
            );
        }
    }

    #[test]
    fn test_identical_endpoints_give_single_point() {
        let path = build_path(UIET, UIET, DEFAULT_STEPS);

        assert_eq!(path.points(), &[UIET]);
    }

    #[test]
    fn test_zero_steps_clamped() {
        let path = build_path(SEOUL, UIET, 0);

        assert_eq!(path.points(), &[SEOUL, UIET]);
    }

    #[test]
    fn test_bearing_diagonal() {
        // tan(theta) = cos(1 deg) on the sphere
        let b = bearing(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0));
        assert_relative_eq!(b, 44.9956, epsilon = 1e-3);
    }

    #[test]
    fn test_bearing_due_north_and_east() {
        let origin = Coordinate::new(0.0, 0.0);
        assert_relative_eq!(bearing(origin, Coordinate::new(0.0, 10.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, Coordinate::new(10.0, 0.0)), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_coordinate_serializes_as_position() {
        let json = serde_json::to_string(&Coordinate::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");

        let back: Coordinate = serde_json::from_str("[76.7552951,30.7481711]").unwrap();
        assert_eq!(back, UIET);
    }

    proptest! {
        #[test]
        fn prop_path_starts_at_origin(
            lon1 in -180.0f64..180.0, lat1 in -89.0f64..89.0,
            lon2 in -180.0f64..180.0, lat2 in -89.0f64..89.0,
            steps in 1usize..600,
        ) {
            let origin = Coordinate::new(lon1, lat1);
            let path = build_path(origin, Coordinate::new(lon2, lat2), steps);

            prop_assert!(!path.is_empty());
            prop_assert_eq!(path.origin(), origin);
            prop_assert!(path.len() == 1 || path.len() == steps + 1);
        }

        #[test]
        fn prop_identical_endpoints_start_at_origin(
            lon in -180.0f64..180.0, lat in -90.0f64..90.0,
        ) {
            let c = Coordinate::new(lon, lat);
            let path = build_path(c, c, DEFAULT_STEPS);

            prop_assert_eq!(path.points(), &[c][..]);
        }
    }
}
