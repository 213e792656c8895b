//! Configuration management for the cartograph edit engine
//!
//! This module handles all configuration settings with sensible defaults,
//! optional TOML file loading and environment variable overrides.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Edit history configuration
    pub history: HistoryConfig,

    /// Spatial index configuration
    pub spatial: SpatialConfig,

    /// Backup persistence configuration
    pub backup: BackupConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Edit history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Duration of an eased edit transition, in milliseconds
    pub transition_duration_ms: u64,
}

/// Spatial index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Grid cell size, in coordinate units (degrees for lon/lat data)
    pub cell_size: f64,
}

/// Backup persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Fixed prefix for the backup blob key
    pub key_prefix: String,

    /// Origin string appended to the key so installations do not conflict
    pub origin: String,

    /// Name of the single-writer session lock
    pub lock_name: String,

    /// Idle period after the last stable change before a backup fires, in milliseconds
    pub idle_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            transition_duration_ms: 150,
        }
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self { cell_size: 0.05 }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            key_prefix: "cartograph".to_string(),
            origin: "local".to_string(),
            lock_name: "cartograph_lock".to_string(),
            idle_delay_ms: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration: defaults, then optional config file, then environment overrides
    pub fn load() -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Ok(file_config) = Self::from_file("cartograph.toml") {
            config = file_config;
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(ms) = env::var("CARTOGRAPH_TRANSITION_MS") {
            self.history.transition_duration_ms = ms
                .parse()
                .map_err(|e| Error::config(format!("Invalid transition duration: {}", e)))?;
        }

        if let Ok(size) = env::var("CARTOGRAPH_CELL_SIZE") {
            self.spatial.cell_size = size
                .parse()
                .map_err(|e| Error::config(format!("Invalid cell size: {}", e)))?;
        }

        if let Ok(origin) = env::var("CARTOGRAPH_ORIGIN") {
            self.backup.origin = origin;
        }

        if let Ok(ms) = env::var("CARTOGRAPH_BACKUP_IDLE_MS") {
            self.backup.idle_delay_ms = ms
                .parse()
                .map_err(|e| Error::config(format!("Invalid backup idle delay: {}", e)))?;
        }

        if let Ok(level) = env::var("CARTOGRAPH_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.history.transition_duration_ms == 0 {
            return Err(Error::config("Transition duration must be nonzero"));
        }

        if !(self.spatial.cell_size.is_finite() && self.spatial.cell_size > 0.0) {
            return Err(Error::config("Spatial cell size must be positive"));
        }

        if self.backup.key_prefix.is_empty() {
            return Err(Error::config("Backup key prefix must not be empty"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        Ok(())
    }

    /// The blob store key under which backups are written
    pub fn backup_key(&self) -> String {
        format!(
            "{}_{}_saved_history",
            self.backup.key_prefix, self.backup.origin
        )
    }

    /// Transition duration as a `Duration`
    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.history.transition_duration_ms)
    }

    /// Backup idle delay as a `Duration`
    pub fn backup_idle_delay(&self) -> Duration {
        Duration::from_millis(self.backup.idle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history.transition_duration_ms, 150);
    }

    #[test]
    fn backup_key_includes_origin() {
        let mut config = EngineConfig::default();
        config.backup.origin = "session9".to_string();
        assert_eq!(config.backup_key(), "cartograph_session9_saved_history");
    }

    #[test]
    fn rejects_bad_cell_size() {
        let mut config = EngineConfig::default();
        config.spatial.cell_size = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            [history]
            transition_duration_ms = 300

            [backup]
            origin = "test"
            "#,
        )
        .unwrap();
        assert_eq!(config.history.transition_duration_ms, 300);
        assert_eq!(config.backup.origin, "test");
        assert_eq!(config.spatial.cell_size, 0.05);
    }
}
