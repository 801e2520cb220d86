//! Built-in scenes.
//!
//! Static scenes draw one frame and then return the stop sentinel; the
//! display retains the frame. Animated scenes keep requesting frames and
//! carry their state in the scratchpad, never in the scene object: the
//! same scene instance serves every device.

use std::sync::Arc;

use core_scene::{Scene, SceneRegistry};

pub mod bounce;
pub mod empty;
pub mod fill;
pub mod text;

pub use bounce::BounceScene;
pub use empty::EmptyScene;
pub use fill::FillScene;
pub use text::TextScene;

/// Bootstrap population of the registry. Individual failures are logged
/// and skipped inside `register_all`; the daemon starts with whatever
/// registered cleanly.
pub fn register_builtins(registry: &mut SceneRegistry) -> usize {
    let scenes: Vec<Arc<dyn Scene>> = vec![
        Arc::new(EmptyScene),
        Arc::new(FillScene),
        Arc::new(TextScene),
        Arc::new(BounceScene),
    ];
    registry.register_all(scenes)
}
