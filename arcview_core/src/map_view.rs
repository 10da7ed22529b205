//! Map view: viewport, controls and one animated arc per origin.
//!
//! The view does not draw anything. `render()` produces a `MapFrame`, the
//! complete set of inputs a map widget needs for the current display
//! frame (camera, style, GeoJSON sources, layers and pin markers).
//!
//! # Lifecycle
//!
//! ```text
//!   new() ──► mount() ──► sync()/on_frame() ... ──► unmount() ──► mount() ...
//!             fly-to       new arcs start          frames cancelled,
//!             arcs start   animating               markers at origin
//! ```

use std::sync::Arc;

use arcview_env::FrameScheduler;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::animator::{ArcId, MarkerAnimator, TickOutcome};
use crate::config::ArcViewConfig;
use crate::features::{self, Feature, FeatureCollection, LayerSpec};
use crate::geodesy::{build_path, Coordinate};
use crate::palette::ColorBook;
use crate::registry::{origin_key, OriginEntry, OriginRegistry};

/// Pin marker size in pixels.
pub const PIN_SIZE: u32 = 20;

/// Animation length of a camera flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightDuration {
    /// Derived by the widget from distance and speed
    Auto,
    Millis(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    FlyTo { speed: f64, duration: FlightDuration },
}

/// Camera state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

impl Viewport {
    /// Camera before mount: centred over India.
    pub fn initial() -> Self {
        Self {
            longitude: 78.97082512588096,
            latitude: 25.275005879170045,
            zoom: 3.8325797292588644,
            bearing: 0.0,
            pitch: 0.0,
            transition: None,
        }
    }

    /// Returns this viewport flown to `center` at `zoom`.
    pub fn fly_to(&self, center: Coordinate, zoom: f64, speed: f64) -> Self {
        Self {
            longitude: center.longitude,
            latitude: center.latitude,
            zoom,
            transition: Some(Transition::FlyTo {
                speed,
                duration: FlightDuration::Auto,
            }),
            ..*self
        }
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.longitude, self.latitude)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Fullscreen,
    Navigation,
    Scale,
}

/// Absolute position of a map control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlacement {
    pub kind: ControlKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<u32>,
    pub left: u32,
    pub padding: String,
}

/// Fullscreen, navigation and scale controls stacked on the left edge.
pub fn default_controls() -> Vec<ControlPlacement> {
    let at = |kind, top, bottom| ControlPlacement {
        kind,
        top,
        bottom,
        left: 0,
        padding: "10px".to_string(),
    };
    vec![
        at(ControlKind::Fullscreen, Some(36), None),
        at(ControlKind::Navigation, Some(72), None),
        at(ControlKind::Scale, None, Some(36)),
    ]
}

/// Static pin drawn at an arc's origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinMarker {
    pub position: Coordinate,
    pub color: String,
    pub size: u32,
    pub offset_top: i32,
    pub offset_left: i32,
}

/// One origin's route, moving marker and pin.
#[derive(Debug, Clone)]
pub struct ArcVisual {
    key: String,
    origin: Coordinate,
    color: String,
    animator: MarkerAnimator,
}

impl ArcVisual {
    fn new(
        id: ArcId,
        entry: &OriginEntry,
        destination: Coordinate,
        steps: usize,
        color: String,
    ) -> Self {
        let path = Arc::new(build_path(entry.coordinate, destination, steps));
        Self {
            key: entry.key.clone(),
            origin: entry.coordinate,
            color,
            animator: MarkerAnimator::new(id, path, steps),
        }
    }

    /// Rebuilds the route from a new origin and rewinds the marker.
    ///
    /// The key, and with it the layer and source ids, follow the origin.
    fn move_origin(
        &mut self,
        origin: Coordinate,
        color: String,
        destination: Coordinate,
        frames: &mut FrameScheduler<ArcId>,
    ) {
        self.key = origin_key(origin);
        self.origin = origin;
        self.color = color;
        let path = Arc::new(build_path(origin, destination, self.animator.steps()));
        self.animator.replace_path(path, frames);
    }

    pub fn id(&self) -> ArcId {
        self.animator.id()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn animator(&self) -> &MarkerAnimator {
        &self.animator
    }

    pub fn route_collection(&self) -> FeatureCollection {
        FeatureCollection::single(Feature::line(self.animator.path()))
    }

    pub fn point_collection(&self) -> FeatureCollection {
        FeatureCollection::single(Feature::point(self.animator.position(), self.animator.bearing()))
    }

    pub fn pin(&self) -> PinMarker {
        PinMarker {
            position: self.origin,
            color: self.color.clone(),
            size: PIN_SIZE,
            offset_top: -(PIN_SIZE as i32),
            offset_left: -(PIN_SIZE as i32) / 2,
        }
    }

    pub fn layers(&self) -> Vec<LayerSpec> {
        vec![features::route_layer(&self.key), features::point_layer(&self.key)]
    }

    fn to_frame(&self) -> ArcFrame {
        ArcFrame {
            key: self.key.clone(),
            index: self.animator.index(),
            route_source: features::route_source_id(&self.key),
            route: self.route_collection(),
            point_source: features::point_source_id(&self.key),
            point: self.point_collection(),
            layers: self.layers(),
            pin: self.pin(),
        }
    }
}

/// Rendered state of one arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcFrame {
    pub key: String,
    pub index: usize,
    pub route_source: String,
    pub route: FeatureCollection,
    pub point_source: String,
    pub point: FeatureCollection,
    pub layers: Vec<LayerSpec>,
    pub pin: PinMarker,
}

/// Everything the map widget needs for one display frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFrame {
    pub frame: u64,
    pub viewport: Viewport,
    pub style: String,

    /// Whether an access token is configured; the token itself stays out
    pub token_configured: bool,
    pub controls: Vec<ControlPlacement>,
    pub arcs: Vec<ArcFrame>,
}

/// Result of moving an arc's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OriginChange {
    /// The view is mounted; the first tick on the new route already ran
    Restarted(TickOutcome),

    /// The view is unmounted; the marker waits at the new origin
    Idle,
}

/// What one display frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub ticked: usize,
    pub halted: usize,
}

pub struct MapView {
    viewport: Viewport,
    style: String,
    token_configured: bool,
    controls: Vec<ControlPlacement>,

    destination: Coordinate,
    steps: usize,
    fly_to_zoom: f64,
    fly_to_speed: f64,

    /// Arc `i` belongs to registry entry `i`
    arcs: Vec<ArcVisual>,
    palette: ColorBook,
    mounted: bool,
    frame: u64,
}

impl MapView {
    pub fn new(config: &ArcViewConfig) -> Self {
        Self {
            viewport: config.initial_viewport,
            style: config.map_style.clone(),
            token_configured: config.access_token.is_some(),
            controls: default_controls(),
            destination: config.destination,
            steps: config.steps.max(1),
            fly_to_zoom: config.fly_to_zoom,
            fly_to_speed: config.fly_to_speed,
            arcs: Vec::new(),
            palette: ColorBook::new(config.color_seed),
            mounted: false,
            frame: 0,
        }
    }

    /// Flies the camera to the destination and starts every arc.
    pub fn mount(&mut self, frames: &mut FrameScheduler<ArcId>) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        self.viewport = self.viewport.fly_to(self.destination, self.fly_to_zoom, self.fly_to_speed);
        info!(
            "map mounted, flying to [{}, {}] at zoom {}",
            self.destination.longitude, self.destination.latitude, self.fly_to_zoom
        );
        for arc in &mut self.arcs {
            arc.animator.start(frames);
        }
    }

    /// Creates arcs for registry entries that have none yet.
    ///
    /// Returns the number of arcs added. New arcs start animating right
    /// away when the view is mounted.
    pub fn sync(&mut self, registry: &OriginRegistry, frames: &mut FrameScheduler<ArcId>) -> usize {
        let existing = self.arcs.len();
        for entry in registry.entries().iter().skip(existing) {
            let id = ArcId(self.arcs.len());
            let color = self.palette.color_for(&entry.key);
            let mut arc = ArcVisual::new(id, entry, self.destination, self.steps, color);
            debug!("arc {} for origin {}", id.0, entry.key);
            if self.mounted {
                arc.animator.start(frames);
            }
            self.arcs.push(arc);
        }
        self.arcs.len() - existing
    }

    /// Dispatches one display frame to the animators that asked for it.
    pub fn on_frame(&mut self, frames: &mut FrameScheduler<ArcId>) -> FrameReport {
        let due = frames.take_due();
        self.frame = frames.frames_dispatched();

        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };
        for (_, id) in due {
            let Some(arc) = self.arcs.get_mut(id.0) else {
                continue;
            };
            report.ticked += 1;
            if arc.animator.tick(frames).is_terminal() {
                report.halted += 1;
            }
        }
        report
    }

    /// Cancels every pending frame and puts each marker back at its origin.
    pub fn unmount(&mut self, frames: &mut FrameScheduler<ArcId>) {
        for arc in &mut self.arcs {
            arc.animator.cancel(frames);
        }
        self.mounted = false;
        info!("map unmounted ({} arcs reset)", self.arcs.len());
    }

    /// User pan/zoom.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Moves the origin of an existing arc.
    ///
    /// The marker restarts only while the view is mounted; an unmounted
    /// view leaves it idle at the new origin until the next `mount()`.
    /// Returns `None` for an unknown arc.
    pub fn set_origin(
        &mut self,
        id: ArcId,
        origin: Coordinate,
        frames: &mut FrameScheduler<ArcId>,
    ) -> Option<OriginChange> {
        let destination = self.destination;
        let arc = self.arcs.get_mut(id.0)?;
        let color = self.palette.color_for(&origin_key(origin));
        arc.move_origin(origin, color, destination, frames);
        debug!("arc {} moved to origin {}", id.0, arc.key);

        if self.mounted {
            Some(OriginChange::Restarted(arc.animator.start(frames)))
        } else {
            Some(OriginChange::Idle)
        }
    }

    pub fn render(&self) -> MapFrame {
        MapFrame {
            frame: self.frame,
            viewport: self.viewport,
            style: self.style.clone(),
            token_configured: self.token_configured,
            controls: self.controls.clone(),
            arcs: self.arcs.iter().map(ArcVisual::to_frame).collect(),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn arcs(&self) -> &[ArcVisual] {
        &self.arcs
    }

    pub fn arc(&self, id: ArcId) -> Option<&ArcVisual> {
        self.arcs.get(id.0)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn destination(&self) -> Coordinate {
        self.destination
    }
}
