//! Real backend: renders locally, ships frames over HTTP.
//!
//! The wire format targets the small LAN panels this daemon drives: a JSON
//! body with the hex-encoded RGB frame on `POST /api/frame`, brightness on
//! `POST /api/brightness`, reset on `POST /api/reset`. Endpoint details are
//! backend-private; nothing outside this module depends on them.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::canvas::{format_number, Canvas};
use crate::{
    Align, DrawError, Driver, DriverKind, OpStatus, Pos, PushError, PushReport, Rgba, Size,
};

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpDriver {
    base_url: String,
    canvas: Canvas,
    client: reqwest::Client,
    /// Brightness to send alongside the next frame, once changed.
    pending_brightness: Option<u8>,
    /// False until the first successful round trip.
    reachable: bool,
}

impl HttpDriver {
    /// `ip` is the inventory address; size comes from the device type.
    pub fn new(ip: &str, size: Size) -> Self {
        Self {
            base_url: format!("http://{ip}"),
            canvas: Canvas::new(size),
            client: reqwest::Client::builder()
                .timeout(PUSH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            pending_brightness: None,
            reachable: false,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), PushError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(PushError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Real
    }

    fn size(&self) -> Size {
        self.canvas.size()
    }

    fn clear(&mut self) -> Result<(), DrawError> {
        self.canvas.clear();
        Ok(())
    }

    fn draw_pixel(&mut self, pos: Pos, color: Rgba) -> Result<(), DrawError> {
        self.canvas.set_pixel(pos, color)
    }

    fn draw_line(&mut self, a: Pos, b: Pos, color: Rgba) -> Result<(), DrawError> {
        self.canvas.line(a, b, color);
        Ok(())
    }

    fn draw_rect(&mut self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.canvas.rect(pos, size, color);
        Ok(())
    }

    fn fill_rect(&mut self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.canvas.fill_rect(pos, size, color);
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
        self.canvas
            .text(&format_number(value, max_digits), pos, color, align);
        Ok(OpStatus::Done)
    }

    fn draw_image(
        &mut self,
        path: &str,
        _pos: Pos,
        _size: Option<Size>,
        _alpha: u8,
    ) -> Result<OpStatus, DrawError> {
        tracing::debug!(target: "driver.http", path, "image_not_supported");
        Ok(OpStatus::NotSupported)
    }

    fn set_brightness(&mut self, level: u8) -> OpStatus {
        self.pending_brightness = Some(level);
        OpStatus::Done
    }

    async fn push(&mut self) -> Result<PushReport, PushError> {
        if let Some(level) = self.pending_brightness.take() {
            if let Err(e) = self.post("/api/brightness", json!({ "level": level })).await {
                // Frame delivery matters more than brightness; retry next push.
                tracing::warn!(target: "driver.http", error = %e, "brightness_failed");
                self.pending_brightness = Some(level);
            }
        }

        let size = self.canvas.size();
        let body = json!({
            "w": size.width,
            "h": size.height,
            "frame": self.canvas.encode_hex(),
        });
        let started = Instant::now();
        let sent = self.post("/api/frame", body).await;
        self.reachable = sent.is_ok();
        sent?;
        let diff = self.canvas.mark_shipped();
        Ok(PushReport {
            diff_pixels: diff,
            elapsed: started.elapsed(),
        })
    }

    async fn reset(&mut self) -> Result<(), PushError> {
        self.canvas.clear();
        self.post("/api/reset", json!({})).await
    }

    fn is_ready(&self) -> bool {
        self.reachable
    }
}
