//! Show or edit a scene's persisted frame.

use clap::Subcommand;

use phyvision_common::config::AppConfig;
use phyvision_scene_model::geometry::Frame;
use phyvision_scene_model::scene::{resolve_frame, FrameDefaults, JsonSceneStore, SceneStore};

#[derive(Debug, Clone, Subcommand)]
pub enum FrameAction {
    /// Print the frame (deriving the default if none is saved)
    Show,

    /// Restore the default size, keeping the position
    Reset,

    /// Move the frame origin
    Move {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
    },

    /// Resize the frame, keeping the origin
    Resize { w: f64, h: f64 },
}

pub fn run(config: &AppConfig, scene: String, action: FrameAction) -> anyhow::Result<()> {
    let store = JsonSceneStore::open(&config.state_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open scene store: {e}"))?;
    let defaults = FrameDefaults {
        width: config.viewport.default_width,
        aspect: config.aspect_ratio()?,
    };

    let frame = apply(&store, &scene, &defaults, &action)?;
    print_frame(&scene, &frame);
    Ok(())
}

/// Apply `action` to the scene's frame and persist the result.
fn apply(
    store: &dyn SceneStore,
    scene: &str,
    defaults: &FrameDefaults,
    action: &FrameAction,
) -> anyhow::Result<Frame> {
    let current = resolve_frame(store, scene, defaults)?;

    let updated = match action {
        FrameAction::Show => return Ok(current),
        FrameAction::Reset => {
            let default = defaults.frame()?;
            current.resized(default.w(), default.h())?
        }
        FrameAction::Move { x, y } => current.moved_to(*x, *y)?,
        FrameAction::Resize { w, h } => current.resized(*w, *h)?,
    };

    let mut record = store.load_scene(scene)?;
    record.frame = Some(updated);
    store.save_scene(&record)?;
    tracing::info!(scene = %scene, ?action, "Frame updated");
    Ok(updated)
}

fn print_frame(scene: &str, frame: &Frame) {
    println!("Scene: {scene}");
    println!("  Origin: ({}, {})", frame.x(), frame.y());
    println!("  Size: {} x {}", frame.w(), frame.h());
    let center = frame.center();
    println!("  Center: ({}, {})", center.x, center.y);
}
