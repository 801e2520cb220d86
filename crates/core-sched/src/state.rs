//! Per-device runtime state and pacing policy.

use std::time::{Duration, Instant};

use core_scene::SceneLogLevel;
use serde_json::Value;

/// Device lifecycle status.
///
/// ```text
/// idle ──switch──▶ switching ──init ok──▶ running ⇄ paused
///                     │                     │
///                     ├─init err─▶ error    ├──stop──▶ stopping ──cleanup──▶ stopped
///                     └─stop req─▶ stopping
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Switching,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Switching => "switching",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

/// Scheduler timing knobs. All values are process-wide configuration; the
/// stop timeout additionally adapts to the running scene's own cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Floor for scene-requested delays; bounds CPU and network load.
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Floor for the stop acknowledgement wait during a switch.
    pub stop_timeout_floor: Duration,
    pub error_backoff: Duration,
    /// Render times above this are logged; pacing is unaffected.
    pub slow_frame_warn: Duration,
    /// Poll interval of a parked worker (paused / stopped / no scene).
    pub idle_tick: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(60),
            stop_timeout_floor: Duration::from_millis(200),
            error_backoff: Duration::from_millis(500),
            slow_frame_warn: Duration::from_millis(300),
            idle_tick: Duration::from_millis(250),
        }
    }
}

impl Pacing {
    pub fn clamp(&self, requested: Duration) -> Duration {
        requested.clamp(self.min_interval, self.max_interval)
    }

    /// Stop acknowledgement bound: twice the scene's current adaptive
    /// interval, never below the configured floor.
    pub fn stop_timeout(&self, last_delay: Duration) -> Duration {
        (last_delay * 2).max(self.stop_timeout_floor)
    }
}

/// Everything the daemon tracks about one device's scene run.
#[derive(Debug, Clone)]
pub struct DeviceRun {
    pub current_scene: Option<String>,
    pub target_scene: Option<String>,
    pub status: RunStatus,
    pub play: PlayState,
    /// Strictly increasing across the process lifetime; bumped on every
    /// authoritative switch and never otherwise.
    pub generation: u64,
    pub started_at: Instant,
    pub frames_pushed: u64,
    pub log_level: SceneLogLevel,
    /// Payload of the last authoritative switch; re-used by re-renders.
    pub payload: Value,
    /// Last clamped delay the scene requested; feeds the stop timeout.
    pub last_delay: Duration,
}

impl DeviceRun {
    pub fn new(log_level: SceneLogLevel) -> Self {
        Self {
            current_scene: None,
            target_scene: None,
            status: RunStatus::Idle,
            play: PlayState::Stopped,
            generation: 0,
            started_at: Instant::now(),
            frames_pushed: 0,
            log_level,
            payload: Value::Null,
            last_delay: Duration::ZERO,
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            scene: self.current_scene.clone(),
            status: self.status,
            play: self.play,
            generation: self.generation,
            payload: self.payload.clone(),
            log_level: self.log_level,
            started_at: self.started_at,
            frames_pushed: self.frames_pushed,
        }
    }
}

/// Value snapshot the worker renders from; no locks held while rendering.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub scene: Option<String>,
    pub status: RunStatus,
    pub play: PlayState,
    pub generation: u64,
    pub payload: Value,
    pub log_level: SceneLogLevel,
    pub started_at: Instant,
    pub frames_pushed: u64,
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Clamped delays always land inside the configured window.
        #[test]
        fn clamp_stays_in_window(ms in 0u64..1_000_000) {
            let p = Pacing::default();
            let out = p.clamp(Duration::from_millis(ms));
            prop_assert!(out >= p.min_interval);
            prop_assert!(out <= p.max_interval);
        }

        // The stop timeout never drops below its floor and scales with cadence.
        #[test]
        fn stop_timeout_at_least_floor(ms in 0u64..100_000) {
            let p = Pacing::default();
            let t = p.stop_timeout(Duration::from_millis(ms));
            prop_assert!(t >= p.stop_timeout_floor);
            prop_assert!(t >= Duration::from_millis(ms));
        }
    }
}
