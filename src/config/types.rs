//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::listener::ListenerSettings;
use crate::screen::ScreenId;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Output format ("pretty", "compact", "json")
    pub format: String,

    /// Directory for a daily-rolling log file (None = stdout only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}

/// What happens when a second physical screen connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalConnectMode {
    /// External screen mirrors the built-in one
    #[default]
    Mirror,
    /// External screen extends the built-in one
    Extend,
    /// Leave both screens standalone
    None,
}

impl fmt::Display for ExternalConnectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExternalConnectMode::Mirror => "mirror",
            ExternalConnectMode::Extend => "extend",
            ExternalConnectMode::None => "none",
        };
        f.write_str(name)
    }
}

/// Screen topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreensConfig {
    /// Built-in (internal) screen id
    pub default_screen_id: u64,

    /// Ids at or above this value are virtual screens
    pub virtual_screen_id_start: u64,

    /// Combination applied when a second physical screen connects
    pub external_connect_mode: ExternalConnectMode,

    /// Density assigned to screens that do not report one
    pub default_density: f32,
}

impl Default for ScreensConfig {
    fn default() -> Self {
        Self {
            default_screen_id: 0,
            virtual_screen_id_start: 1000,
            external_connect_mode: ExternalConnectMode::Mirror,
            default_density: 1.0,
        }
    }
}

impl ScreensConfig {
    /// Built-in screen id
    pub fn default_screen(&self) -> ScreenId {
        ScreenId::new(self.default_screen_id)
    }
}

/// Listener registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenersConfig {
    /// Listener calls slower than this are logged (milliseconds)
    pub slow_listener_warn_ms: u64,

    /// Registrations allowed per event kind
    pub max_listeners_per_kind: usize,
}

impl Default for ListenersConfig {
    fn default() -> Self {
        Self {
            slow_listener_warn_ms: 100,
            max_listeners_per_kind: 256,
        }
    }
}

impl ListenersConfig {
    /// Registry settings
    pub fn settings(&self) -> ListenerSettings {
        ListenerSettings {
            slow_listener_warn: Duration::from_millis(self.slow_listener_warn_ms),
            max_listeners_per_kind: self.max_listeners_per_kind,
        }
    }
}

/// Coordinate conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatesConfig {
    /// Cached placement older than this is re-fetched (milliseconds)
    pub refresh_interval_ms: u64,

    /// Screen reported for points outside every screen
    pub fallback_screen_id: u64,
}

impl Default for CoordinatesConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            fallback_screen_id: 0,
        }
    }
}

impl CoordinatesConfig {
    /// Placement refresh interval
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Fallback screen id
    pub fn fallback_screen(&self) -> ScreenId {
        ScreenId::new(self.fallback_screen_id)
    }
}
