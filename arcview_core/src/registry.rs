//! Deduplicated origin registry.
//!
//! Origins are keyed by their longitude text immediately followed by their
//! latitude text, each written the way a JSON producer's number-to-string
//! does it (shortest round-trip digits, `1e-7` and `1e+21` style exponents
//! outside `[1e-6, 1e21)`, `-0` as `0`). A key is accepted once; later
//! inserts with the same key are dropped. Entries are never removed, and
//! insertion order is render order.
//!
//! The seen-set lives inside the registry, so its lifetime is the
//! session's and two registries never share state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geodesy::Coordinate;

/// Origins shown before any message arrives.
pub const DEFAULT_ORIGINS: [Coordinate; 3] = [
    Coordinate::new(126.8494654, 37.5650172),
    Coordinate::new(115.837023, 39.9375346),
    Coordinate::new(54.947555, 25.0757595),
];

/// Derives the registry key for a coordinate.
pub fn origin_key(coordinate: Coordinate) -> String {
    format!("{}{}", number_text(coordinate.longitude), number_text(coordinate.latitude))
}

/// Shortest decimal text of `value` in ECMAScript `Number::toString` form.
fn number_text(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{value}");
    }

    // `{:e}` gives "1.5e21" / "1e-7"; positive exponents carry a sign
    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => text,
    }
}

/// One registered origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginEntry {
    pub key: String,
    pub coordinate: Coordinate,
}

/// Append-only, deduplicated list of origins.
#[derive(Debug, Clone, Default)]
pub struct OriginRegistry {
    entries: Vec<OriginEntry>,
    seen: HashSet<String>,
}

impl OriginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with `origins` (deduplicated, in order).
    pub fn seeded(origins: impl IntoIterator<Item = Coordinate>) -> Self {
        let mut registry = Self::new();
        for origin in origins {
            registry.add_origin(origin);
        }
        registry
    }

    /// Creates a registry seeded with `DEFAULT_ORIGINS`.
    pub fn with_defaults() -> Self {
        Self::seeded(DEFAULT_ORIGINS)
    }

    /// Appends `coordinate` unless its key was already seen.
    ///
    /// Returns `true` if the registry grew.
    pub fn add_origin(&mut self, coordinate: Coordinate) -> bool {
        let key = origin_key(coordinate);
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.entries.push(OriginEntry { key, coordinate });
        true
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn get(&self, index: usize) -> Option<&OriginEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[OriginEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_is_plain_concatenation() {
        assert_eq!(
            origin_key(Coordinate::new(126.8494654, 37.5650172)),
            "126.849465437.5650172"
        );
        assert_eq!(origin_key(Coordinate::new(1.0, -2.5)), "1-2.5");
    }

    #[test]
    fn test_number_text_edges() {
        assert_eq!(number_text(-0.0), "0");
        assert_eq!(number_text(0.0), "0");
        assert_eq!(number_text(0.000001), "0.000001");
        assert_eq!(number_text(0.0000001), "1e-7");
        assert_eq!(number_text(-1.5e-9), "-1.5e-9");
        assert_eq!(number_text(1e20), "100000000000000000000");
        assert_eq!(number_text(1e21), "1e+21");
        assert_eq!(number_text(f64::NAN), "NaN");
        assert_eq!(number_text(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_negative_zero_shares_key_with_zero() {
        assert_eq!(origin_key(Coordinate::new(-0.0, 5.0)), "05");

        let mut registry = OriginRegistry::new();
        assert!(registry.add_origin(Coordinate::new(0.0, 5.0)));
        assert!(!registry.add_origin(Coordinate::new(-0.0, 5.0)));
        assert_eq!(origin_key(Coordinate::new(1e-7, 2.0)), "1e-72");
    }

    #[test]
    fn test_defaults_are_seeded_in_order() {
        let registry = OriginRegistry::with_defaults();

        assert_eq!(registry.len(), 3);
        let coords: Vec<_> = registry.entries().iter().map(|e| e.coordinate).collect();
        assert_eq!(coords, DEFAULT_ORIGINS.to_vec());
    }

    #[test]
    fn test_seeded_origin_is_not_added_again() {
        let mut registry = OriginRegistry::with_defaults();

        assert!(!registry.add_origin(DEFAULT_ORIGINS[1]));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_new_origin_is_appended() {
        let mut registry = OriginRegistry::with_defaults();
        let delhi = Coordinate::new(77.1025, 28.7041);

        assert!(registry.add_origin(delhi));
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get(3).map(|e| e.coordinate), Some(delhi));
        assert!(registry.contains_key(&origin_key(delhi)));
    }

    #[test]
    fn test_registries_do_not_share_seen_keys() {
        let mut a = OriginRegistry::new();
        let mut b = OriginRegistry::new();
        let c = Coordinate::new(3.0, 4.0);

        assert!(a.add_origin(c));
        assert!(b.add_origin(c));
    }

    proptest! {
        #[test]
        fn prop_duplicate_insert_keeps_size(
            lon in -180.0f64..180.0, lat in -90.0f64..90.0,
            seeded in any::<bool>(),
        ) {
            let mut registry = if seeded {
                OriginRegistry::with_defaults()
            } else {
                OriginRegistry::new()
            };
            let c = Coordinate::new(lon, lat);

            registry.add_origin(c);
            let size = registry.len();
            prop_assert!(!registry.add_origin(c));
            prop_assert_eq!(registry.len(), size);
        }
    }
}
