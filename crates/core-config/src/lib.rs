//! Daemon configuration and device inventory.
//!
//! Parses `pixeld.toml`: process-wide topic prefixes and defaults under
//! `[daemon]`, scheduler timing under `[pacing]`, and the device inventory
//! as `[[devices]]` entries. Every field is optional and unknown fields are
//! tolerated so the file can evolve, but a file that exists and fails to
//! parse or validate is fatal: a daemon driving hardware should not start
//! on a half-read inventory. A missing file yields built-in defaults with
//! an empty inventory.

use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonSection {
    #[serde(default = "DaemonSection::default_cmd_prefix")]
    pub cmd_prefix: String,
    #[serde(default = "DaemonSection::default_state_topic_base")]
    pub state_topic_base: String,
    /// Driver for devices missing from the inventory or without one.
    #[serde(default = "DaemonSection::default_driver")]
    pub default_driver: String,
    #[serde(default = "DaemonSection::default_width")]
    pub default_width: u16,
    #[serde(default = "DaemonSection::default_height")]
    pub default_height: u16,
}

impl DaemonSection {
    fn default_cmd_prefix() -> String {
        "pixeld/cmd".into()
    }
    fn default_state_topic_base() -> String {
        "pixeld/state".into()
    }
    fn default_driver() -> String {
        "mock".into()
    }
    const fn default_width() -> u16 {
        64
    }
    const fn default_height() -> u16 {
        64
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            cmd_prefix: Self::default_cmd_prefix(),
            state_topic_base: Self::default_state_topic_base(),
            default_driver: Self::default_driver(),
            default_width: Self::default_width(),
            default_height: Self::default_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PacingSection {
    #[serde(default = "PacingSection::default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "PacingSection::default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "PacingSection::default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "PacingSection::default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "PacingSection::default_slow_frame_warn_ms")]
    pub slow_frame_warn_ms: u64,
}

impl PacingSection {
    const fn default_min_interval_ms() -> u64 {
        50
    }
    const fn default_max_interval_ms() -> u64 {
        60_000
    }
    const fn default_stop_timeout_ms() -> u64 {
        200
    }
    const fn default_error_backoff_ms() -> u64 {
        500
    }
    const fn default_slow_frame_warn_ms() -> u64 {
        300
    }
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            min_interval_ms: Self::default_min_interval_ms(),
            max_interval_ms: Self::default_max_interval_ms(),
            stop_timeout_ms: Self::default_stop_timeout_ms(),
            error_backoff_ms: Self::default_error_backoff_ms(),
            slow_frame_warn_ms: Self::default_slow_frame_warn_ms(),
        }
    }
}

/// One inventory entry. Drivers and log levels stay strings here and are
/// validated by [`ConfigFile::validate`]; the binary maps them onto the
/// typed driver/scheduler surfaces.
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceEntry {
    pub name: String,
    pub ip: String,
    /// Panel model: `p64` is 64x64, `s32` is 32x8. Unknown models use the
    /// daemon default size.
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub startup_scene: Option<String>,
    #[serde(default)]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl DeviceEntry {
    /// Panel size for this entry, given the daemon defaults.
    pub fn size(&self, default_width: u16, default_height: u16) -> (u16, u16) {
        match self.device_type.as_deref() {
            Some("p64") => (64, 64),
            Some("s32") => (32, 8),
            _ => (default_width, default_height),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub pacing: PacingSection,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

const DRIVERS: [&str; 2] = ["real", "mock"];
const LOG_LEVELS: [&str; 5] = ["debug", "info", "warning", "error", "silent"];

impl ConfigFile {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !DRIVERS.contains(&self.daemon.default_driver.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "default_driver `{}` (expected real|mock)",
                self.daemon.default_driver
            )));
        }
        if self.pacing.min_interval_ms == 0 || self.pacing.min_interval_ms > self.pacing.max_interval_ms
        {
            return Err(ConfigError::Invalid(format!(
                "pacing window {}..{} ms",
                self.pacing.min_interval_ms, self.pacing.max_interval_ms
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for dev in &self.devices {
            if dev.name.is_empty() || dev.name.contains(['/', '+', '#']) {
                return Err(ConfigError::Invalid(format!(
                    "device name `{}` is not a valid topic segment",
                    dev.name
                )));
            }
            if !seen.insert(dev.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device `{}`",
                    dev.name
                )));
            }
            if let Some(driver) = dev.driver.as_deref() {
                if !DRIVERS.contains(&driver) {
                    return Err(ConfigError::Invalid(format!(
                        "device `{}` driver `{driver}`",
                        dev.name
                    )));
                }
            }
            if let Some(level) = dev.log_level.as_deref() {
                if !LOG_LEVELS.contains(&level) {
                    return Err(ConfigError::Invalid(format!(
                        "device `{}` log_level `{level}`",
                        dev.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Best-effort config path: working directory first, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("pixeld.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("pixeld").join("pixeld.toml");
    }
    PathBuf::from("pixeld.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<ConfigFile, ConfigError> {
    let path = path.unwrap_or_else(discover);
    if !path.exists() {
        warn!(target: "config", path = %path.display(), "config_missing_using_defaults");
        return Ok(ConfigFile::default());
    }
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    file.validate()?;
    info!(
        target: "config",
        path = %path.display(),
        devices = file.devices.len(),
        cmd_prefix = %file.daemon.cmd_prefix,
        "config_loaded"
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), content).unwrap();
        tmp
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_from(Some(PathBuf::from("__no_such_pixeld__.toml"))).unwrap();
        assert_eq!(cfg.daemon.cmd_prefix, "pixeld/cmd");
        assert_eq!(cfg.daemon.default_driver, "mock");
        assert_eq!(cfg.pacing.min_interval_ms, 50);
        assert!(cfg.devices.is_empty());
    }

    #[test]
    fn parses_inventory_and_sections() {
        let tmp = write_config(
            r#"
[daemon]
cmd_prefix = "home/pixel/cmd"
default_driver = "mock"

[pacing]
min_interval_ms = 40

[[devices]]
name = "kitchen"
ip = "192.168.1.30"
device_type = "p64"
driver = "real"
startup_scene = "bounce"
brightness = 80

[[devices]]
name = "desk"
ip = "192.168.1.31"
device_type = "s32"
"#,
        );
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.daemon.cmd_prefix, "home/pixel/cmd");
        assert_eq!(cfg.pacing.min_interval_ms, 40);
        assert_eq!(cfg.pacing.max_interval_ms, 60_000, "untouched default");
        assert_eq!(cfg.devices.len(), 2);
        assert_eq!(cfg.devices[0].size(64, 64), (64, 64));
        assert_eq!(cfg.devices[1].size(64, 64), (32, 8));
        assert_eq!(cfg.devices[1].driver, None, "falls back to default driver");
    }

    #[test]
    fn parse_error_is_fatal() {
        let tmp = write_config("[daemon\ncmd_prefix = broken");
        assert!(matches!(
            load_from(Some(tmp.path().to_path_buf())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn bad_driver_is_rejected() {
        let tmp = write_config(
            r#"
[[devices]]
name = "desk"
ip = "10.0.0.2"
driver = "serial"
"#,
        );
        assert!(matches!(
            load_from(Some(tmp.path().to_path_buf())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn duplicate_device_names_are_rejected() {
        let tmp = write_config(
            r#"
[[devices]]
name = "desk"
ip = "10.0.0.2"

[[devices]]
name = "desk"
ip = "10.0.0.3"
"#,
        );
        assert!(matches!(
            load_from(Some(tmp.path().to_path_buf())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn inverted_pacing_window_is_rejected() {
        let tmp = write_config("[pacing]\nmin_interval_ms = 1000\nmax_interval_ms = 100\n");
        assert!(matches!(
            load_from(Some(tmp.path().to_path_buf())),
            Err(ConfigError::Invalid(_))
        ));
    }
}
