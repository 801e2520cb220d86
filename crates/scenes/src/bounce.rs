//! Bouncing pixel, the scratchpad demo scene.

use async_trait::async_trait;
use core_driver::{Pos, Rgba};
use core_scene::{FrameContext, Scene, SceneError, SceneInfo, SceneTick};
use serde_json::json;

const FRAME_MS: u64 = 50;

/// A single pixel bouncing off the panel edges. Position and velocity live
/// in the scratchpad, so every device runs its own independent animation
/// and a re-entry starts from the center again.
pub struct BounceScene;

#[async_trait]
impl Scene for BounceScene {
    fn name(&self) -> &str {
        "bounce"
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            name: "bounce".into(),
            description: "bouncing pixel demo".into(),
            category: "animated".into(),
            wants_loop: true,
            dev: true,
        }
    }

    async fn init(&self, ctx: &mut FrameContext<'_>) -> Result<(), SceneError> {
        let env = ctx.env();
        ctx.set_state("x", json!(env.width as i64 / 2));
        ctx.set_state("y", json!(env.height as i64 / 2));
        ctx.set_state("dx", json!(1));
        ctx.set_state("dy", json!(1));
        Ok(())
    }

    async fn render(&self, ctx: &mut FrameContext<'_>) -> Result<SceneTick, SceneError> {
        let env = ctx.env().clone();
        let mut x = ctx.get_state("x", json!(0)).as_i64().unwrap_or(0);
        let mut y = ctx.get_state("y", json!(0)).as_i64().unwrap_or(0);
        let mut dx = ctx.get_state("dx", json!(1)).as_i64().unwrap_or(1);
        let mut dy = ctx.get_state("dy", json!(1)).as_i64().unwrap_or(1);

        x += dx;
        y += dy;
        if x <= 0 || x >= env.width as i64 - 1 {
            dx = -dx;
            x = x.clamp(0, env.width as i64 - 1);
        }
        if y <= 0 || y >= env.height as i64 - 1 {
            dy = -dy;
            y = y.clamp(0, env.height as i64 - 1);
        }

        let color = ctx
            .payload
            .get("color")
            .and_then(Rgba::from_json)
            .unwrap_or(Rgba::rgb(0, 255, 128));
        ctx.draw().clear().await?;
        ctx.draw()
            .draw_pixel(Pos::new(x as i32, y as i32), color)
            .await?;

        ctx.set_state("x", json!(x));
        ctx.set_state("y", json!(y));
        ctx.set_state("dx", json!(dx));
        ctx.set_state("dy", json!(dy));
        Ok(SceneTick::after_ms(FRAME_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_driver::{DevicePanel, DriverKind, Size};
    use core_scene::{FrameStamp, SceneLog, SceneLogLevel, StateStore};
    use serde_json::Value;

    fn ctx_parts() -> (DevicePanel, StateStore) {
        (
            DevicePanel::new("desk", "127.0.0.1", Size::new(8, 8), DriverKind::Mock),
            StateStore::new(),
        )
    }

    #[tokio::test]
    async fn position_advances_between_frames() {
        let (panel, store) = ctx_parts();
        let payload = Value::Null;
        let scene = BounceScene;
        let log = SceneLog::new("desk", "bounce", SceneLogLevel::Silent);

        let mut ctx = FrameContext::new(
            &panel, &store, "bounce", &payload, FrameStamp::default(), log.clone(),
        );
        scene.init(&mut ctx).await.unwrap();
        assert_eq!(store.get("desk", "bounce", "x"), Some(json!(4)));

        let mut ctx = FrameContext::new(
            &panel, &store, "bounce", &payload, FrameStamp::default(), log.clone(),
        );
        let tick = scene.render(&mut ctx).await.unwrap();
        assert_eq!(tick, SceneTick::after_ms(FRAME_MS));
        assert_eq!(store.get("desk", "bounce", "x"), Some(json!(5)));
        assert_eq!(store.get("desk", "bounce", "y"), Some(json!(5)));
    }

    #[tokio::test]
    async fn velocity_flips_at_the_edge() {
        let (panel, store) = ctx_parts();
        let payload = Value::Null;
        let scene = BounceScene;
        store.set("desk", "bounce", "x", json!(6));
        store.set("desk", "bounce", "y", json!(3));
        store.set("desk", "bounce", "dx", json!(1));
        store.set("desk", "bounce", "dy", json!(1));

        let mut ctx = FrameContext::new(
            &panel,
            &store,
            "bounce",
            &payload,
            FrameStamp::default(),
            SceneLog::new("desk", "bounce", SceneLogLevel::Silent),
        );
        scene.render(&mut ctx).await.unwrap();
        assert_eq!(store.get("desk", "bounce", "x"), Some(json!(7)));
        assert_eq!(store.get("desk", "bounce", "dx"), Some(json!(-1)));
    }
}
