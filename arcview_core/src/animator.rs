//! Per-marker animation along a precomputed route.
//!
//! Each tick moves the marker to `path[index]` and points it along the
//! segment it is on. The animator re-requests a frame while
//! `index < steps`, and the index is incremented on every successful
//! tick, including the last one. A further tick then finds no segment and
//! halts.
//!
//! ```text
//! index:   0        1        ...   steps-1      steps       steps+1
//!          tick ─►  tick ─►  ...   tick ─►      tick (no     Halted
//!          (req)    (req)          (req)        request)
//! ```

use std::sync::Arc;

use arcview_env::{FrameScheduler, FrameToken};
use serde::{Deserialize, Serialize};

use crate::geodesy::{bearing, Coordinate, GeodesicPath};

/// Identifies one arc (and its animator) within a map view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArcId(pub usize);

/// Result of one animation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The marker moved.
    Advanced {
        position: Coordinate,
        bearing: f64,
        /// Whether another frame was requested
        scheduled_next: bool,
    },
    /// No segment at the current index; nothing was scheduled.
    Halted,
}

impl TickOutcome {
    /// True if this tick left nothing scheduled.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TickOutcome::Advanced { scheduled_next: true, .. })
    }
}

/// Animation state machine for one marker.
#[derive(Debug, Clone)]
pub struct MarkerAnimator {
    id: ArcId,
    path: Arc<GeodesicPath>,
    steps: usize,

    /// Current path index (monotonic until reset)
    index: usize,
    position: Coordinate,

    /// Heading in degrees; unset until the first successful tick
    bearing: Option<f64>,

    /// Frame requested by the last tick, if any
    pending: Option<FrameToken>,
}

impl MarkerAnimator {
    /// Creates an idle animator positioned at the path origin.
    ///
    /// `steps` is the route's sampling count, clamped to >= 1.
    pub fn new(id: ArcId, path: Arc<GeodesicPath>, steps: usize) -> Self {
        let position = path.origin();
        Self {
            id,
            path,
            steps: steps.max(1),
            index: 0,
            position,
            bearing: None,
            pending: None,
        }
    }

    /// Runs the first tick immediately (the mount-time call).
    pub fn start(&mut self, frames: &mut FrameScheduler<ArcId>) -> TickOutcome {
        self.tick(frames)
    }

    /// Advances by one path index.
    ///
    /// Called by the frame driver when this animator's frame fires.
    pub fn tick(&mut self, frames: &mut FrameScheduler<ArcId>) -> TickOutcome {
        // whatever frame brought us here has fired
        self.pending = None;

        let (start_idx, end_idx) = if self.index >= self.steps {
            (self.index.checked_sub(1), self.index)
        } else {
            (Some(self.index), self.index + 1)
        };

        let start = start_idx.and_then(|i| self.path.get(i));
        let end = self.path.get(end_idx);
        let (Some(start), Some(end)) = (start, end) else {
            return TickOutcome::Halted;
        };

        let Some(position) = self.path.get(self.index) else {
            return TickOutcome::Halted;
        };
        let heading = bearing(start, end);
        self.position = position;
        self.bearing = Some(heading);

        let scheduled_next = self.index < self.steps;
        if scheduled_next {
            self.pending = Some(frames.request_frame(self.id));
        }
        self.index += 1;

        TickOutcome::Advanced {
            position,
            bearing: heading,
            scheduled_next,
        }
    }

    /// Cancels any pending frame and rewinds to the path origin.
    ///
    /// This is the unmount / origin-change reset. The last bearing is kept.
    pub fn cancel(&mut self, frames: &mut FrameScheduler<ArcId>) {
        if let Some(token) = self.pending.take() {
            frames.cancel_frame(token);
        }
        self.index = 0;
        self.position = self.path.origin();
    }

    /// Swaps in a new route and rewinds to its origin without ticking.
    pub fn replace_path(&mut self, path: Arc<GeodesicPath>, frames: &mut FrameScheduler<ArcId>) {
        self.cancel(frames);
        self.path = path;
        self.position = self.path.origin();
    }

    /// Swaps in a new route and restarts from its origin.
    pub fn set_path(
        &mut self,
        path: Arc<GeodesicPath>,
        frames: &mut FrameScheduler<ArcId>,
    ) -> TickOutcome {
        self.replace_path(path, frames);
        self.start(frames)
    }

    pub fn id(&self) -> ArcId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    pub fn bearing(&self) -> Option<f64> {
        self.bearing
    }

    pub fn path(&self) -> &Arc<GeodesicPath> {
        &self.path
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// True while a frame request is outstanding.
    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }
}
