//! Per-device scene logging.
//!
//! Scenes log through the context, not through `tracing` directly; the
//! device's minimum level is fixed when the context is built, so a chatty
//! scene on a mock device stays silent while the same scene on real
//! hardware surfaces warnings.

use core_driver::DriverKind;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SceneLogLevel {
    Debug,
    Info,
    Warning,
    Error,
    /// Drops everything.
    Silent,
}

impl SceneLogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "silent" => Some(Self::Silent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Silent => "silent",
        }
    }

    /// Real panels default to warnings, mock panels stay silent.
    pub fn default_for(kind: DriverKind) -> Self {
        match kind {
            DriverKind::Real => Self::Warning,
            DriverKind::Mock => Self::Silent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneLog {
    host: String,
    scene: String,
    min: SceneLogLevel,
}

impl SceneLog {
    pub fn new(host: &str, scene: &str, min: SceneLogLevel) -> Self {
        Self {
            host: host.to_string(),
            scene: scene.to_string(),
            min,
        }
    }

    pub fn min_level(&self) -> SceneLogLevel {
        self.min
    }

    pub fn enabled(&self, level: SceneLogLevel) -> bool {
        self.min != SceneLogLevel::Silent && level >= self.min
    }

    pub fn log(&self, level: SceneLogLevel, msg: &str) {
        self.log_meta(level, msg, None);
    }

    pub fn log_meta(&self, level: SceneLogLevel, msg: &str, meta: Option<&Value>) {
        if !self.enabled(level) {
            return;
        }
        let meta = meta.map(|m| m.to_string());
        match level {
            SceneLogLevel::Debug => tracing::debug!(
                target: "scene",
                host = %self.host, scene = %self.scene, meta = meta.as_deref(), "{msg}"
            ),
            SceneLogLevel::Info => tracing::info!(
                target: "scene",
                host = %self.host, scene = %self.scene, meta = meta.as_deref(), "{msg}"
            ),
            SceneLogLevel::Warning => tracing::warn!(
                target: "scene",
                host = %self.host, scene = %self.scene, meta = meta.as_deref(), "{msg}"
            ),
            SceneLogLevel::Error | SceneLogLevel::Silent => tracing::error!(
                target: "scene",
                host = %self.host, scene = %self.scene, meta = meta.as_deref(), "{msg}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_filters() {
        let log = SceneLog::new("desk", "fill", SceneLogLevel::Warning);
        assert!(!log.enabled(SceneLogLevel::Debug));
        assert!(!log.enabled(SceneLogLevel::Info));
        assert!(log.enabled(SceneLogLevel::Warning));
        assert!(log.enabled(SceneLogLevel::Error));
    }

    #[test]
    fn silent_drops_everything() {
        let log = SceneLog::new("desk", "fill", SceneLogLevel::Silent);
        assert!(!log.enabled(SceneLogLevel::Error));
    }

    #[test]
    fn defaults_follow_driver_kind() {
        assert_eq!(
            SceneLogLevel::default_for(DriverKind::Real),
            SceneLogLevel::Warning
        );
        assert_eq!(
            SceneLogLevel::default_for(DriverKind::Mock),
            SceneLogLevel::Silent
        );
    }

    #[test]
    fn parse_round_trips() {
        for s in ["debug", "info", "warning", "error", "silent"] {
            assert_eq!(SceneLogLevel::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(SceneLogLevel::parse("verbose"), None);
    }
}
