//! Display drivers and the per-device proxy.
//!
//! A [`Driver`] is one concrete way of getting pixels onto a panel: the real
//! variant renders into a local [`Canvas`] and ships encoded frames over
//! HTTP, the mock variant additionally journals every drawing op and ships
//! nothing. [`DevicePanel`] is the per-host facade the rest of the daemon
//! sees; it owns the current driver, performs hot-swaps at frame boundaries,
//! and keeps the per-device counters.

use std::time::Duration;

use async_trait::async_trait;

pub mod canvas;
pub mod http;
pub mod metrics;
pub mod mock;
pub mod proxy;

pub use canvas::Canvas;
pub use http::HttpDriver;
pub use metrics::{PanelMetrics, PanelMetricsSnapshot};
pub use mock::MockDriver;
pub use proxy::{DevicePanel, PushOutcome};

/// Pixel position, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Panel dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// 8-bit RGBA color. Alpha blends over the existing canvas content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `[r, g, b]` / `[r, g, b, a]` JSON arrays as used in scene
    /// payloads. Out-of-range components are clamped.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let arr = value.as_array()?;
        if arr.len() < 3 || arr.len() > 4 {
            return None;
        }
        let comp = |i: usize, dflt: i64| -> u8 {
            arr.get(i)
                .and_then(|v| v.as_i64())
                .unwrap_or(dflt)
                .clamp(0, 255) as u8
        };
        Some(Self::new(comp(0, 0), comp(1, 0), comp(2, 0), comp(3, 255)))
    }
}

/// Horizontal alignment for text and number drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// Outcome of an optional drawing op the backend may not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Done,
    NotSupported,
}

/// Which backend a driver instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Real,
    Mock,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Mock => "mock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "real" => Some(Self::Real),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("position ({x},{y}) outside {width}x{height} panel")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u16,
        height: u16,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("device rejected frame: http {0}")]
    Rejected(u16),
}

/// What a completed push reports back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    /// Pixels that changed relative to the previously pushed frame.
    pub diff_pixels: u64,
    /// Transport round trip, excluding local encode time.
    pub elapsed: Duration,
}

/// One concrete display backend.
///
/// Drawing ops are synchronous mutations of local state; only `push` and
/// `reset` touch the network. Ops a backend cannot express return
/// `OpStatus::NotSupported` rather than failing.
#[async_trait]
pub trait Driver: Send {
    fn kind(&self) -> DriverKind;
    fn size(&self) -> Size;

    fn clear(&mut self) -> Result<(), DrawError>;
    fn draw_pixel(&mut self, pos: Pos, color: Rgba) -> Result<(), DrawError>;
    fn draw_line(&mut self, a: Pos, b: Pos, color: Rgba) -> Result<(), DrawError>;
    fn draw_rect(&mut self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError>;
    fn fill_rect(&mut self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError>;
    fn draw_text(
        &mut self,
        text: &str,
        pos: Pos,
        color: Rgba,
        align: Align,
    ) -> Result<OpStatus, DrawError>;
    fn draw_number(
        &mut self,
        value: i64,
        pos: Pos,
        color: Rgba,
        align: Align,
        max_digits: u8,
    ) -> Result<OpStatus, DrawError>;
    fn draw_image(
        &mut self,
        path: &str,
        pos: Pos,
        size: Option<Size>,
        alpha: u8,
    ) -> Result<OpStatus, DrawError>;
    fn set_brightness(&mut self, level: u8) -> OpStatus;

    /// Ship the current frame. For real drivers the completed push is the
    /// definitive hardware ACK.
    async fn push(&mut self) -> Result<PushReport, PushError>;
    /// Best-effort device reset.
    async fn reset(&mut self) -> Result<(), PushError>;

    fn is_ready(&self) -> bool;
}
