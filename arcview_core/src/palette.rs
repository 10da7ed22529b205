//! Per-arc pin colours.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Hands out one bright colour per key and remembers it.
#[derive(Debug, Clone)]
pub struct ColorBook {
    rng: ChaCha8Rng,
    colors: HashMap<String, String>,
}

impl ColorBook {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            colors: HashMap::new(),
        }
    }

    /// Returns the colour for `key`, generating it on first use.
    pub fn color_for(&mut self, key: &str) -> String {
        if let Some(color) = self.colors.get(key) {
            return color.clone();
        }
        let color = self.bright_color();
        self.colors.insert(key.to_string(), color.clone());
        color
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    // High saturation and value keep pins readable on a dark basemap
    fn bright_color(&mut self) -> String {
        let hue = self.rng.gen_range(0.0..360.0);
        let saturation = self.rng.gen_range(0.55..=1.0);
        let value = self.rng.gen_range(0.76..=1.0);
        let (r, g, b) = hsv_to_rgb(hue, saturation, value);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl Default for ColorBook {
    fn default() -> Self {
        Self::new(0)
    }
}

fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let chroma = value * saturation;
    let sector = (hue / 60.0) % 6.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    let to_byte = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_cached_per_key() {
        let mut book = ColorBook::new(7);
        let first = book.color_for("a");

        assert_eq!(book.color_for("a"), first);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_colors_are_hex() {
        let mut book = ColorBook::new(1);
        for key in ["x", "y", "z"] {
            let color = book.color_for(key);
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_same_seed_same_colors() {
        let mut a = ColorBook::new(42);
        let mut b = ColorBook::new(42);

        assert_eq!(a.color_for("k1"), b.color_for("k1"));
        assert_eq!(a.color_for("k2"), b.color_for("k2"));
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
    }
}
