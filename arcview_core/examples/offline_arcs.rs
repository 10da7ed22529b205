//! Offline arcs - animate the seed origins without a broker
//!
//! Builds the default arcs, runs the frame loop until every marker has
//! landed, and prints the final map frame as JSON.
//!
//! Run:
//! ```bash
//! cargo run -p arcview_core --example offline_arcs
//! ```

use arcview_core::map_view::MapView;
use arcview_core::{ArcViewConfig, OriginRegistry};
use arcview_env::FrameScheduler;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ArcViewConfig {
        steps: 50,
        ..ArcViewConfig::default()
    };

    let registry = OriginRegistry::seeded(config.origins.iter().copied());
    let mut view = MapView::new(&config);
    let mut frames = FrameScheduler::new();

    view.sync(&registry, &mut frames);
    view.mount(&mut frames);

    let mut frame_count = 0;
    while frames.pending() > 0 {
        let report = view.on_frame(&mut frames);
        frame_count += 1;
        if report.halted > 0 {
            println!("frame {}: {} markers landed", report.frame, report.halted);
        }
    }
    println!("{} arcs done after {} frames\n", view.arcs().len(), frame_count);

    println!("{}", serde_json::to_string_pretty(&view.render())?);
    Ok(())
}
