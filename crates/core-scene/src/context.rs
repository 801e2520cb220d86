//! Frame context handed to scene lifecycle calls.

use core_driver::{Align, DevicePanel, DrawError, OpStatus, Pos, Rgba, Size};
use serde_json::Value;

use crate::log::{SceneLog, SceneLogLevel};
use crate::store::StateStore;

/// Device geometry exposed to scenes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEnv {
    pub width: u16,
    pub height: u16,
    pub host: String,
}

/// Drawing-only view of the device panel.
///
/// Scenes draw through this surface; push, reset and driver swaps are not
/// reachable from here. Frame cadence and delivery belong to the scheduler.
pub struct DrawSurface<'a> {
    panel: &'a DevicePanel,
}

impl<'a> DrawSurface<'a> {
    pub fn size(&self) -> Size {
        self.panel.size()
    }

    pub async fn clear(&self) -> Result<(), DrawError> {
        self.panel.clear().await
    }

    pub async fn draw_pixel(&self, pos: Pos, color: Rgba) -> Result<(), DrawError> {
        self.panel.draw_pixel(pos, color).await
    }

    pub async fn draw_line(&self, a: Pos, b: Pos, color: Rgba) -> Result<(), DrawError> {
        self.panel.draw_line(a, b, color).await
    }

    pub async fn draw_rect(&self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.panel.draw_rect(pos, size, color).await
    }

    pub async fn fill_rect(&self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.panel.fill_rect(pos, size, color).await
    }

    pub async fn draw_text(
        &self,
        text: &str,
        pos: Pos,
        color: Rgba,
        align: Align,
    ) -> Result<OpStatus, DrawError> {
        self.panel.draw_text(text, pos, color, align).await
    }

    pub async fn draw_number(
        &self,
        value: i64,
        pos: Pos,
        color: Rgba,
        align: Align,
        max_digits: u8,
    ) -> Result<OpStatus, DrawError> {
        self.panel
            .draw_number(value, pos, color, align, max_digits)
            .await
    }

    pub async fn draw_image(
        &self,
        path: &str,
        pos: Pos,
        size: Option<Size>,
        alpha: u8,
    ) -> Result<OpStatus, DrawError> {
        self.panel.draw_image(path, pos, size, alpha).await
    }
}

/// Frame counters stamped by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStamp {
    pub generation: u64,
    /// Frames rendered since this scene entered the device.
    pub frame_count: u64,
    /// Milliseconds since scene entry.
    pub elapsed_ms: u64,
    /// Wall-clock time of the previous frame's push, 0 on the first frame.
    pub frametime_ms: u64,
    pub loop_driven: bool,
}

/// Created fresh for every `init`/`render`/`cleanup` call.
pub struct FrameContext<'a> {
    env: DeviceEnv,
    surface: DrawSurface<'a>,
    store: &'a StateStore,
    scene: String,
    pub payload: &'a Value,
    pub stamp: FrameStamp,
    log: SceneLog,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        panel: &'a DevicePanel,
        store: &'a StateStore,
        scene: &str,
        payload: &'a Value,
        stamp: FrameStamp,
        log: SceneLog,
    ) -> Self {
        let size = panel.size();
        Self {
            env: DeviceEnv {
                width: size.width,
                height: size.height,
                host: panel.host().to_string(),
            },
            surface: DrawSurface { panel },
            store,
            scene: scene.to_string(),
            payload,
            stamp,
            log,
        }
    }

    pub fn env(&self) -> &DeviceEnv {
        &self.env
    }

    pub fn draw(&self) -> &DrawSurface<'a> {
        &self.surface
    }

    /// Scratchpad read with caller default.
    pub fn get_state(&self, key: &str, default: Value) -> Value {
        self.store
            .get_or(&self.env.host, &self.scene, key, default)
    }

    pub fn set_state(&self, key: &str, value: Value) {
        self.store.set(&self.env.host, &self.scene, key, value);
    }

    /// Payload field shortcut; `None` when absent or of the wrong shape.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }

    pub fn log(&self, level: SceneLogLevel, msg: &str) {
        self.log.log(level, msg);
    }

    pub fn log_meta(&self, level: SceneLogLevel, msg: &str, meta: &Value) {
        self.log.log_meta(level, msg, Some(meta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_driver::DriverKind;
    use serde_json::json;

    fn panel() -> DevicePanel {
        DevicePanel::new("desk", "127.0.0.1", Size::new(16, 8), DriverKind::Mock)
    }

    #[tokio::test]
    async fn context_exposes_env_and_scratchpad() {
        let panel = panel();
        let store = StateStore::new();
        let payload = json!({"color": [1, 2, 3]});
        let ctx = FrameContext::new(
            &panel,
            &store,
            "fill",
            &payload,
            FrameStamp::default(),
            SceneLog::new("desk", "fill", SceneLogLevel::Silent),
        );
        assert_eq!(ctx.env().width, 16);
        assert_eq!(ctx.env().host, "desk");

        assert_eq!(ctx.get_state("n", json!(0)), json!(0));
        ctx.set_state("n", json!(41));
        assert_eq!(ctx.get_state("n", json!(0)), json!(41));
        assert_eq!(store.get("desk", "fill", "n"), Some(json!(41)));
    }

    #[tokio::test]
    async fn draw_surface_reaches_the_panel() {
        let panel = panel();
        let store = StateStore::new();
        let payload = Value::Null;
        let ctx = FrameContext::new(
            &panel,
            &store,
            "fill",
            &payload,
            FrameStamp::default(),
            SceneLog::new("desk", "fill", SceneLogLevel::Silent),
        );
        ctx.draw().draw_pixel(Pos::new(1, 1), Rgba::WHITE).await.unwrap();
        let outcome = panel.push().await.unwrap();
        assert_eq!(outcome.diff_pixels, 1);
    }
}
