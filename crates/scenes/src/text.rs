//! Static text from the payload.

use async_trait::async_trait;
use core_driver::{Align, Pos, Rgba};
use core_scene::{FrameContext, Scene, SceneError, SceneInfo, SceneTick};

/// Draws `payload.text` with optional `color` and `align`; defaults to the
/// host name, white, centered. One frame, then done.
pub struct TextScene;

#[async_trait]
impl Scene for TextScene {
    fn name(&self) -> &str {
        "text"
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: "text".into(),
            description: "static text from payload".into(),
            category: "static".into(),
            wants_loop: false,
            dev: false,
        }
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        if ctx.stamp.frame_count > 0 {
            return Ok(SceneTick::Done);
        }
        let env = ctx.env().clone();
        let text = ctx
            .payload_str("text")
            .unwrap_or(&env.host)
            .to_uppercase();
        let color = ctx
            .payload
            .get("color")
            .and_then(Rgba::from_json)
            .unwrap_or(Rgba::WHITE);
        let align = ctx
            .payload_str("align")
            .and_then(Align::parse)
            .unwrap_or(Align::Center);
        let x = match align {
            Align::Left => 0,
            Align::Center => env.width as i32 / 2,
            Align::Right => env.width as i32 - 1,
        };
        let y = (env.height as i32 - 5) / 2;
        ctx.draw().clear().await?;
        ctx.draw().draw_text(&text, Pos::new(x, y), color, align).await?;
        Ok(SceneTick::ASAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_driver::{DevicePanel, DriverKind, Size};
    use core_scene::{FrameStamp, SceneLog, SceneLogLevel, StateStore};
    use serde_json::json;

    #[tokio::test]
    async fn draws_payload_text_once() {
        let panel = DevicePanel::new("desk", "127.0.0.1", Size::new(32, 8), DriverKind::Mock);
        let store = StateStore::new();
        let payload = json!({"text": "hi", "align": "left"});
        let scene = TextScene;
        let mut ctx = FrameContext::new(
            &panel,
            &store,
            "text",
            &payload,
            FrameStamp::default(),
            SceneLog::new("desk", "text", SceneLogLevel::Silent),
        );
        assert_eq!(scene.render(&mut ctx).await.unwrap(), SceneTick::ASAP);
        let outcome = panel.push().await.unwrap();
        assert!(outcome.diff_pixels > 0, "glyph pixels were drawn");
    }
}
