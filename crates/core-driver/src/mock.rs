//! Mock backend: full drawing semantics, no hardware.

use async_trait::async_trait;

use crate::canvas::{format_number, Canvas};
use crate::{
    Align, DrawError, Driver, DriverKind, OpStatus, Pos, PushError, PushReport, Rgba, Size,
};

/// In-memory driver. Renders into the shared [`Canvas`] like the real
/// backend so scenes behave identically, and additionally journals every op.
/// `push` drains the journal into a debug summary. Never stamps liveness;
/// the proxy checks the driver kind before touching `last_seen_ts`.
pub struct MockDriver {
    canvas: Canvas,
    ops: Vec<String>,
    brightness: u8,
}

impl MockDriver {
    pub fn new(size: Size) -> Self {
        Self {
            canvas: Canvas::new(size),
            ops: Vec::new(),
            brightness: 255,
        }
    }

    /// Ops recorded since the last push (test hook).
    pub fn pending_ops(&self) -> &[String] {
        &self.ops
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    fn record(&mut self, op: String) {
        self.ops.push(op);
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mock
    }

    fn size(&self) -> Size {
        self.canvas.size()
    }

    fn clear(&mut self) -> Result<(), DrawError> {
        self.canvas.clear();
        self.record("clear".into());
        Ok(())
    }

    fn draw_pixel(&mut self, pos: Pos, color: Rgba) -> Result<(), DrawError> {
        self.canvas.set_pixel(pos, color)?;
        self.record(format!("pixel {},{}", pos.x, pos.y));
        Ok(())
    }

    fn draw_line(&mut self, a: Pos, b: Pos, color: Rgba) -> Result<(), DrawError> {
        self.canvas.line(a, b, color);
        self.record(format!("line {},{} -> {},{}", a.x, a.y, b.x, b.y));
        Ok(())
    }

    fn draw_rect(&mut self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.canvas.rect(pos, size, color);
        self.record(format!("rect {},{} {}x{}", pos.x, pos.y, size.width, size.height));
        Ok(())
    }

    fn fill_rect(&mut self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.canvas.fill_rect(pos, size, color);
        self.record(format!(
            "fill {},{} {}x{}",
            pos.x, pos.y, size.width, size.height
        ));
        Ok(())
    }

    fn draw_text(
        &mut self,
        text: &str,
        pos: Pos,
        color: Rgba,
        align: Align,
    ) -> Result<OpStatus, DrawError> {
        self.canvas.text(text, pos, color, align);
        self.record(format!("text {:?} at {},{}", text, pos.x, pos.y));
        Ok(OpStatus::Done)
    }

    fn draw_number(
        &mut self,
        value: i64,
        pos: Pos,
        color: Rgba,
        align: Align,
        max_digits: u8,
    ) -> Result<OpStatus, DrawError> {
        let rendered = format_number(value, max_digits);
        self.canvas.text(&rendered, pos, color, align);
        self.record(format!("number {rendered} at {},{}", pos.x, pos.y));
        Ok(OpStatus::Done)
    }

    fn draw_image(
        &mut self,
        path: &str,
        _pos: Pos,
        _size: Option<Size>,
        _alpha: u8,
    ) -> Result<OpStatus, DrawError> {
        tracing::debug!(target: "driver.mock", path, "image_not_supported");
        Ok(OpStatus::NotSupported)
    }

    fn set_brightness(&mut self, level: u8) -> OpStatus {
        self.brightness = level;
        self.record(format!("brightness {level}"));
        OpStatus::Done
    }

    async fn push(&mut self) -> Result<PushReport, PushError> {
        let ops = std::mem::take(&mut self.ops);
        let diff = self.canvas.mark_shipped();
        tracing::debug!(
            target: "driver.mock",
            ops = ops.len(),
            diff_pixels = diff,
            summary = %ops.join("; "),
            "push"
        );
        Ok(PushReport {
            diff_pixels: diff,
            elapsed: std::time::Duration::ZERO,
        })
    }

    async fn reset(&mut self) -> Result<(), PushError> {
        self.canvas.clear();
        self.ops.clear();
        tracing::debug!(target: "driver.mock", "reset");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_drains_the_op_log() {
        let mut d = MockDriver::new(Size::new(8, 8));
        d.clear().unwrap();
        d.draw_pixel(Pos::new(1, 1), Rgba::WHITE).unwrap();
        assert_eq!(d.pending_ops().len(), 2);
        let report = d.push().await.unwrap();
        assert_eq!(report.diff_pixels, 1);
        assert!(d.pending_ops().is_empty());
    }

    #[tokio::test]
    async fn image_reports_not_supported() {
        let mut d = MockDriver::new(Size::new(8, 8));
        let status = d.draw_image("logo.png", Pos::default(), None, 255).unwrap();
        assert_eq!(status, OpStatus::NotSupported);
    }

    #[test]
    fn always_ready() {
        let d = MockDriver::new(Size::new(8, 8));
        assert!(d.is_ready());
    }
}
