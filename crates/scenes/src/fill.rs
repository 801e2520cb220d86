//! Solid color fill.

use async_trait::async_trait;
use core_driver::{Pos, Rgba, Size};
use core_scene::{FrameContext, Scene, SceneError, SceneInfo, SceneTick};

/// Fills the panel with `payload.color` (`[r, g, b]` or `[r, g, b, a]`,
/// default white) and stops after the frame is out.
pub struct FillScene;

#[async_trait]
impl Scene for FillScene {
    fn name(&self) -> &str {
        "fill"
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: "fill".into(),
            description: "solid color from payload".into(),
            category: "static".into(),
            wants_loop: false,
            dev: false,
        }
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        if ctx.stamp.frame_count > 0 {
            return Ok(SceneTick::Done);
        }
        let color = ctx
            .payload
            .get("color")
            .and_then(Rgba::from_json)
            .unwrap_or(Rgba::WHITE);
        let env = ctx.env().clone();
        ctx.draw()
            .fill_rect(
                Pos::new(0, 0),
                Size::new(env.width, env.height),
                color,
            )
            .await?;
        Ok(SceneTick::ASAP)
    }
}
