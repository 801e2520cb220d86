//! Outbound observability payloads.
//!
//! Three event families leave the daemon: per-frame OK events after each
//! successful push, metrics snapshots, and authoritative scene-state
//! transitions. Consumers de-duplicate on `generationId` and read hardware
//! liveness from `lastSeenTs` (stamped for real drivers only). All payloads
//! are JSON with camelCase keys and an epoch-millisecond `ts`.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Build identity stamped onto frame-ok and scene-state events.
///
/// `version` comes from the crate; build number and commit are injected at
/// build time through `PIXELD_BUILD_NUMBER` / `PIXELD_GIT_COMMIT` and stay
/// absent in local builds.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionStamp {
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<&'static str>,
}

impl VersionStamp {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_number: option_env!("PIXELD_BUILD_NUMBER"),
            git_commit: option_env!("PIXELD_GIT_COMMIT"),
        }
    }
}

impl Default for VersionStamp {
    fn default() -> Self {
        Self::current()
    }
}

/// Emitted after every successful push, in frame order per device.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameOkEvent {
    pub scene: String,
    /// Wall-clock push delta in milliseconds, as timed by the device proxy.
    pub frametime: u64,
    pub diff_pixels: u64,
    pub pushes: u64,
    pub skipped: u64,
    pub errors: u64,
    pub generation_id: u64,
    #[serde(flatten)]
    pub stamp: VersionStamp,
    pub ts: u64,
}

/// Counter snapshot, published after pushes and available on demand.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    pub pushes: u64,
    pub skipped: u64,
    pub errors: u64,
    pub last_frametime: u64,
    /// Last successful push to real hardware; never set by mock drivers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_ts: Option<u64>,
    pub ts: u64,
}

/// Authoritative scene-state transition (switching / running / stopped /
/// error) for `<stateTopicBase>/<host>/scene/state`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneStateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_scene: Option<String>,
    pub status: String,
    pub generation_id: u64,
    #[serde(flatten)]
    pub stamp: VersionStamp,
    pub ts: u64,
}

/// Non-fatal failure surfaced on `<cmdPrefix>/<host>/error`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<u64>,
    pub ts: u64,
}

/// Command acknowledgement on `<cmdPrefix>/<host>/ack`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AckEvent {
    pub section: String,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub ts: u64,
}
