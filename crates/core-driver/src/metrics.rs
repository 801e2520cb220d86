//! Per-device counters.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Counters owned by a [`crate::DevicePanel`]. Plain relaxed atomics; reads
/// hand out value snapshots so no references escape the proxy.
#[derive(Debug, Default)]
pub struct PanelMetrics {
    pushes: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    last_frametime_ms: AtomicU64,
    /// Epoch ms of the last real-driver push ACK; 0 means never seen.
    last_seen_ts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelMetricsSnapshot {
    pub pushes: u64,
    pub skipped: u64,
    pub errors: u64,
    pub last_frametime_ms: u64,
    pub last_seen_ts: Option<u64>,
}

impl PanelMetrics {
    pub fn snapshot(&self) -> PanelMetricsSnapshot {
        let last_seen = self.last_seen_ts.load(Relaxed);
        PanelMetricsSnapshot {
            pushes: self.pushes.load(Relaxed),
            skipped: self.skipped.load(Relaxed),
            errors: self.errors.load(Relaxed),
            last_frametime_ms: self.last_frametime_ms.load(Relaxed),
            last_seen_ts: (last_seen != 0).then_some(last_seen),
        }
    }

    pub fn record_push(&self, frametime_ms: u64) {
        self.pushes.fetch_add(1, Relaxed);
        self.last_frametime_ms.store(frametime_ms, Relaxed);
    }

    pub fn record_seen(&self, epoch_ms: u64) {
        self.last_seen_ts.store(epoch_ms.max(1), Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let m = PanelMetrics::default();
        m.record_push(17);
        m.record_push(23);
        m.record_skipped();
        m.record_error();
        let s = m.snapshot();
        assert_eq!(s.pushes, 2);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.last_frametime_ms, 23);
        assert_eq!(s.last_seen_ts, None);
    }

    #[test]
    fn last_seen_zero_is_never() {
        let m = PanelMetrics::default();
        assert_eq!(m.snapshot().last_seen_ts, None);
        m.record_seen(1234);
        assert_eq!(m.snapshot().last_seen_ts, Some(1234));
    }
}
