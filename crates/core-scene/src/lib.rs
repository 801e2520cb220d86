//! Scene contract and registry.
//!
//! A scene is a named unit of rendering logic: `render` plus optional
//! `init`/`cleanup`. Scene objects are stateless and shared (the same scene
//! can be active on several devices at once), so everything per-device goes
//! through the scratchpad handed in via the frame context.
//!
//! Pure-render contract: `render` draws on the provided surface and returns
//! [`SceneTick::Continue`] with the delay until the next desired frame, or
//! [`SceneTick::Done`] to stop. Scenes never push (the scheduler owns the
//! push), never spawn timers, and never subscribe to anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub mod context;
pub mod log;
pub mod store;

pub use context::{DeviceEnv, DrawSurface, FrameContext, FrameStamp};
pub use log::{SceneLog, SceneLogLevel};
pub use store::StateStore;

use core_driver::DrawError;

/// What a render pass asks of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneTick {
    /// Render again after this delay (clamped by the scheduler's pacing).
    Continue(Duration),
    /// Stop sentinel: the scene is finished on this device.
    Done,
}

impl SceneTick {
    /// Next frame as soon as pacing allows.
    pub const ASAP: SceneTick = SceneTick::Continue(Duration::ZERO);

    pub fn after_ms(ms: u64) -> Self {
        Self::Continue(Duration::from_millis(ms))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Recoverable: counted, surfaced, the loop backs off and retries.
    #[error("render failed: {0}")]
    Render(String),
    /// Stops the scene on this device.
    #[error("fatal scene error: {0}")]
    Fatal(String),
    #[error(transparent)]
    Draw(#[from] DrawError),
}

impl SceneError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Registration-time metadata surfaced by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub name: String,
    pub description: String,
    pub category: String,
    pub wants_loop: bool,
    /// Development / example scene, flagged as such in listings.
    pub dev: bool,
}

#[async_trait]
pub trait Scene: Send + Sync {
    fn name(&self) -> &str;
    fn info(&self) -> SceneInfo;

    /// Runs once on scene entry, after the scratchpad was reset.
    async fn init(&self, _ctx: &mut FrameContext<'_>) -> Result<(), SceneError> {
        Ok(())
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError>;

    /// Runs when the scene leaves the device, before the next scene's init.
    async fn cleanup(&self, _ctx: &mut FrameContext<'_>) -> Result<(), SceneError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("scene `{0}` is already registered")]
    DuplicateName(String),
    #[error("invalid scene: {0}")]
    InvalidScene(String),
    #[error("unknown scene `{0}`")]
    UnknownScene(String),
}

/// Name-keyed scene table. Populated once at bootstrap, immutable afterwards
/// (shared as `Arc<SceneRegistry>`); nothing is removed at runtime.
#[derive(Default)]
pub struct SceneRegistry {
    scenes: HashMap<String, Arc<dyn Scene>>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scene: Arc<dyn Scene>) -> Result<(), RegistryError> {
        let name = scene.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidScene("empty name".into()));
        }
        if name.contains(['/', '+', '#']) {
            return Err(RegistryError::InvalidScene(format!(
                "name `{name}` contains topic syntax"
            )));
        }
        if self.scenes.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        tracing::debug!(target: "scene.registry", scene = %name, "registered");
        self.scenes.insert(name, scene);
        Ok(())
    }

    /// Bootstrap population: bad entries are logged and skipped, never fatal.
    /// Returns how many scenes made it in.
    pub fn register_all(&mut self, scenes: impl IntoIterator<Item = Arc<dyn Scene>>) -> usize {
        let mut accepted = 0;
        for scene in scenes {
            let name = scene.name().to_string();
            match self.register(scene) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    tracing::warn!(target: "scene.registry", scene = %name, error = %e, "scene_skipped");
                }
            }
        }
        accepted
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Scene>, RegistryError> {
        self.scenes
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownScene(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    /// Metadata for every registered scene, sorted by name.
    pub fn list(&self) -> Vec<SceneInfo> {
        let mut infos: Vec<SceneInfo> = self.scenes.values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scenes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
