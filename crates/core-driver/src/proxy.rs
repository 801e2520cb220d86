//! Per-host device facade.

use std::sync::Mutex as StdMutex;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::metrics::{PanelMetrics, PanelMetricsSnapshot};
use crate::{
    Align, DrawError, Driver, DriverKind, HttpDriver, MockDriver, OpStatus, Pos, PushError, Rgba,
    Size,
};

/// Result of a timed push through the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub diff_pixels: u64,
    /// Wall-clock push delta; also recorded as `last_frametime_ms`.
    pub frametime_ms: u64,
}

/// Per-host facade owning the active driver.
///
/// Exactly one driver instance exists at any moment. Hot-swaps are staged
/// through `request_swap` and take effect when `apply_pending_swap` runs
/// (the scheduler calls it between frames, the manager calls it directly
/// for devices without an active loop), so an in-flight frame always sees
/// a single backend. All drawing and push calls for a host serialize
/// through the internal driver lock.
pub struct DevicePanel {
    host: String,
    ip: String,
    size: Size,
    driver: Mutex<Box<dyn Driver>>,
    kind: StdMutex<DriverKind>,
    pending_swap: StdMutex<Option<DriverKind>>,
    brightness: StdMutex<Option<u8>>,
    metrics: PanelMetrics,
}

impl DevicePanel {
    pub fn new(host: &str, ip: &str, size: Size, kind: DriverKind) -> Self {
        Self {
            host: host.to_string(),
            ip: ip.to_string(),
            size,
            driver: Mutex::new(Self::make_driver(ip, size, kind)),
            kind: StdMutex::new(kind),
            pending_swap: StdMutex::new(None),
            brightness: StdMutex::new(None),
            metrics: PanelMetrics::default(),
        }
    }

    fn make_driver(ip: &str, size: Size, kind: DriverKind) -> Box<dyn Driver> {
        match kind {
            DriverKind::Real => Box::new(HttpDriver::new(ip, size)),
            DriverKind::Mock => Box::new(MockDriver::new(size)),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn current_kind(&self) -> DriverKind {
        *self.kind.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn metrics(&self) -> PanelMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stage a driver change. Returns false when the requested kind is
    /// already active and nothing was staged.
    pub fn request_swap(&self, kind: DriverKind) -> bool {
        if self.current_kind() == kind {
            *self.pending_swap.lock().unwrap_or_else(|e| e.into_inner()) = None;
            return false;
        }
        tracing::info!(
            target: "driver",
            host = %self.host,
            to = kind.as_str(),
            "driver_swap_staged"
        );
        *self.pending_swap.lock().unwrap_or_else(|e| e.into_inner()) = Some(kind);
        true
    }

    /// Replace the driver if a swap is staged. Safe to call at any frame
    /// boundary; returns the newly active kind when a swap happened.
    pub async fn apply_pending_swap(&self) -> Option<DriverKind> {
        let staged = self
            .pending_swap
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        let mut driver = self.driver.lock().await;
        *driver = Self::make_driver(&self.ip, self.size, staged);
        if let Some(level) = *self.brightness.lock().unwrap_or_else(|e| e.into_inner()) {
            driver.set_brightness(level);
        }
        *self.kind.lock().unwrap_or_else(|e| e.into_inner()) = staged;
        tracing::info!(
            target: "driver",
            host = %self.host,
            to = staged.as_str(),
            "driver_swap_applied"
        );
        Some(staged)
    }

    pub async fn clear(&self) -> Result<(), DrawError> {
        self.driver.lock().await.clear()
    }

    pub async fn draw_pixel(&self, pos: Pos, color: Rgba) -> Result<(), DrawError> {
        self.driver.lock().await.draw_pixel(pos, color)
    }

    pub async fn draw_line(&self, a: Pos, b: Pos, color: Rgba) -> Result<(), DrawError> {
        self.driver.lock().await.draw_line(a, b, color)
    }

    pub async fn draw_rect(&self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.driver.lock().await.draw_rect(pos, size, color)
    }

    pub async fn fill_rect(&self, pos: Pos, size: Size, color: Rgba) -> Result<(), DrawError> {
        self.driver.lock().await.fill_rect(pos, size, color)
    }

    pub async fn draw_text(
        &self,
        text: &str,
        pos: Pos,
        color: Rgba,
        align: Align,
    ) -> Result<OpStatus, DrawError> {
        self.driver.lock().await.draw_text(text, pos, color, align)
    }

    pub async fn draw_number(
        &self,
        value: i64,
        pos: Pos,
        color: Rgba,
        align: Align,
        max_digits: u8,
    ) -> Result<OpStatus, DrawError> {
        self.driver
            .lock()
            .await
            .draw_number(value, pos, color, align, max_digits)
    }

    pub async fn draw_image(
        &self,
        path: &str,
        pos: Pos,
        size: Option<Size>,
        alpha: u8,
    ) -> Result<OpStatus, DrawError> {
        self.driver.lock().await.draw_image(path, pos, size, alpha)
    }

    /// Remembered on the panel and re-applied after every swap.
    pub async fn set_brightness(&self, level: u8) -> OpStatus {
        *self.brightness.lock().unwrap_or_else(|e| e.into_inner()) = Some(level);
        self.driver.lock().await.set_brightness(level)
    }

    pub async fn is_ready(&self) -> bool {
        self.driver.lock().await.is_ready()
    }

    /// Timed push. On success bumps `pushes`, records the frame time, and,
    /// only when the active backend is real, stamps `last_seen_ts` with the
    /// ACK time. Failures bump `errors`.
    pub async fn push(&self) -> Result<PushOutcome, PushError> {
        let mut driver = self.driver.lock().await;
        let kind = driver.kind();
        let started = Instant::now();
        match driver.push().await {
            Ok(report) => {
                let frametime_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_push(frametime_ms);
                if kind == DriverKind::Real {
                    self.metrics.record_seen(now_epoch_ms());
                }
                tracing::trace!(
                    target: "driver",
                    host = %self.host,
                    frametime_ms,
                    transport_ms = report.elapsed.as_millis() as u64,
                    diff_pixels = report.diff_pixels,
                    "push_ok"
                );
                Ok(PushOutcome {
                    diff_pixels: report.diff_pixels,
                    frametime_ms,
                })
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }

    pub async fn reset(&self) -> Result<(), PushError> {
        let mut driver = self.driver.lock().await;
        let res = driver.reset().await;
        if res.is_err() {
            self.metrics.record_error();
        }
        res
    }

    /// A rendered frame was discarded before push (generation gate).
    pub fn note_skipped(&self) {
        self.metrics.record_skipped();
    }

    /// A render or routing failure attributable to this device.
    pub fn note_error(&self) {
        self.metrics.record_error();
    }
}

fn now_epoch_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_panel() -> DevicePanel {
        DevicePanel::new("desk", "127.0.0.1", Size::new(16, 8), DriverKind::Mock)
    }

    #[tokio::test]
    async fn push_counts_and_mock_never_stamps_liveness() {
        let panel = mock_panel();
        panel.draw_pixel(Pos::new(0, 0), Rgba::WHITE).await.unwrap();
        let outcome = panel.push().await.unwrap();
        assert_eq!(outcome.diff_pixels, 1);
        let m = panel.metrics();
        assert_eq!(m.pushes, 1);
        assert_eq!(m.last_seen_ts, None, "mock pushes are not hardware ACKs");
    }

    #[tokio::test]
    async fn swap_is_deferred_until_applied() {
        let panel = mock_panel();
        assert!(panel.request_swap(DriverKind::Real));
        assert_eq!(panel.current_kind(), DriverKind::Mock, "not applied yet");
        let applied = panel.apply_pending_swap().await;
        assert_eq!(applied, Some(DriverKind::Real));
        assert_eq!(panel.current_kind(), DriverKind::Real);
        assert_eq!(panel.apply_pending_swap().await, None, "slot drained");
    }

    #[tokio::test]
    async fn swap_to_same_kind_is_a_no_op() {
        let panel = mock_panel();
        assert!(!panel.request_swap(DriverKind::Mock));
        assert_eq!(panel.apply_pending_swap().await, None);
    }

    #[tokio::test]
    async fn mock_is_always_ready() {
        let panel = mock_panel();
        assert!(panel.is_ready().await);
    }

    #[tokio::test]
    async fn skip_and_error_notes_land_in_metrics() {
        let panel = mock_panel();
        panel.note_skipped();
        panel.note_error();
        let m = panel.metrics();
        assert_eq!(m.skipped, 1);
        assert_eq!(m.errors, 1);
    }
}
