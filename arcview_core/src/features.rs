//! GeoJSON sources and layer descriptors handed to the map widget.
//!
//! Only the subset the arcs need: `LineString` routes, `Point` markers
//! with free-form properties, and line/symbol layers bound to a source.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::geodesy::{Coordinate, GeodesicPath};

/// Route line colour.
pub const ROUTE_COLOR: &str = "#007cbf";

/// Route line width in pixels.
pub const ROUTE_WIDTH: f64 = 2.0;

/// Icon used for the moving marker.
pub const MARKER_ICON: &str = "airport-15";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    LineString { coordinates: Vec<Coordinate> },
    Point { coordinates: Coordinate },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Route feature covering the whole path.
    pub fn line(path: &GeodesicPath) -> Self {
        Self {
            geometry: Geometry::LineString {
                coordinates: path.points().to_vec(),
            },
            properties: Map::new(),
        }
    }

    /// Marker feature with an optional `bearing` property.
    pub fn point(position: Coordinate, bearing: Option<f64>) -> Self {
        let mut properties = Map::new();
        if let Some(b) = bearing {
            properties.insert("bearing".to_string(), json!(b));
        }
        Self {
            geometry: Geometry::Point { coordinates: position },
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn single(feature: Feature) -> Self {
        Self { features: vec![feature] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Line,
    Symbol,
}

/// One style layer bound to a GeoJSON source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub paint: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub layout: Value,
}

pub fn route_source_id(key: &str) -> String {
    format!("route_src_{key}")
}

pub fn route_layer_id(key: &str) -> String {
    format!("route_lyr_{key}")
}

pub fn point_source_id(key: &str) -> String {
    format!("point_src_{key}")
}

pub fn point_layer_id(key: &str) -> String {
    format!("point_lyr_{key}")
}

/// Line layer drawing the route for `key`.
pub fn route_layer(key: &str) -> LayerSpec {
    LayerSpec {
        id: route_layer_id(key),
        source: route_source_id(key),
        kind: LayerKind::Line,
        paint: json!({
            "line-width": ROUTE_WIDTH,
            "line-color": ROUTE_COLOR,
        }),
        layout: Value::Null,
    }
}

/// Symbol layer drawing the rotating marker for `key`.
pub fn point_layer(key: &str) -> LayerSpec {
    LayerSpec {
        id: point_layer_id(key),
        source: point_source_id(key),
        kind: LayerKind::Symbol,
        paint: Value::Null,
        layout: json!({
            "icon-image": MARKER_ICON,
            "icon-rotate": ["get", "bearing"],
            "icon-rotation-alignment": "map",
            "icon-allow-overlap": true,
            "icon-ignore-placement": true,
        }),
    }
}
