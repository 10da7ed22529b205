//! ArcView Core - great-circle arc animation with live origins
//!
//! Draws one animated arc from every known origin to a fixed destination,
//! and grows the set of origins from location messages arriving over
//! publish/subscribe.
//!
//! # Pieces
//!
//! 1. **Geodesy**: `build_path` samples a great circle into a route
//! 2. **Animator**: `MarkerAnimator` walks a marker along its route, one
//!    display frame at a time
//! 3. **Registry**: `OriginRegistry` keeps origins unique by key
//! 4. **Listener**: `OriginListener` owns the broker connection state
//!    machine and decodes location payloads
//! 5. **Map view**: `MapView` turns all of the above into a `MapFrame`
//! 6. **Session**: `ArcViewSession` runs the cooperative loop
//!
//! The session is generic over `arcview_env::ArcViewContext` and
//! `arcview_env::BrokerConnector`, so the same code runs live and under
//! simulation.

pub mod animator;
pub mod config;
pub mod error;
pub mod features;
pub mod geodesy;
pub mod listener;
pub mod map_view;
pub mod palette;
pub mod registry;
pub mod session;

// Re-export key types for convenience
pub use animator::{ArcId, MarkerAnimator, TickOutcome};
pub use config::ArcViewConfig;
pub use error::{ArcViewError, ListenerError};
pub use geodesy::{bearing, build_path, Coordinate, GeodesicPath};
pub use listener::{ConnectionState, OriginListener, RetryPolicy};
pub use map_view::{MapFrame, MapView, OriginChange, Viewport};
pub use registry::OriginRegistry;
pub use session::{ArcViewSession, SessionStats, StepEvent};
