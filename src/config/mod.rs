//! Configuration management
//!
//! Handles loading and validation of configuration from:
//! - TOML files
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod types;

pub use types::{
    CoordinatesConfig, ExternalConnectMode, ListenersConfig, LoggingConfig, ScreensConfig,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Screen topology configuration
    #[serde(default)]
    pub screens: ScreensConfig,
    /// Listener registry configuration
    #[serde(default)]
    pub listeners: ListenersConfig,
    /// Coordinate conversion configuration
    #[serde(default)]
    pub coordinates: CoordinatesConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        if self.screens.default_screen_id >= self.screens.virtual_screen_id_start {
            anyhow::bail!(
                "default_screen_id ({}) must be below virtual_screen_id_start ({})",
                self.screens.default_screen_id,
                self.screens.virtual_screen_id_start
            );
        }

        let density = self.screens.default_density;
        if density.is_nan() || density <= 0.0 {
            anyhow::bail!(
                "default_density must be positive, got {}",
                self.screens.default_density
            );
        }

        if self.listeners.max_listeners_per_kind == 0 {
            anyhow::bail!("max_listeners_per_kind must be at least 1");
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, log_level: Option<&str>, log_format: Option<&str>) -> Self {
        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }
        if let Some(format) = log_format {
            self.logging.format = format.to_string();
        }
        self
    }
}
