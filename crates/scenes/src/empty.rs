//! Blank panel. The fallback scene of `state/upd`.

use async_trait::async_trait;
use core_scene::{FrameContext, Scene, SceneError, SceneInfo, SceneTick};

pub struct EmptyScene;

#[async_trait]
impl Scene for EmptyScene {
    fn name(&self) -> &str {
        "empty"
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: "empty".into(),
            description: "clears the panel".into(),
            category: "static".into(),
            wants_loop: false,
            dev: false,
        }
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        if ctx.stamp.frame_count > 0 {
            return Ok(SceneTick::Done);
        }
        ctx.draw().clear().await?;
        Ok(SceneTick::ASAP)
    }
}
