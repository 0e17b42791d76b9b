//! CLI configuration persistence
//!
//! Where the state document lives and how the guard runs. The lock settings
//! themselves live in the state document, not here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::monitor::DEFAULT_TICK_INTERVAL;
use crate::store::DEFAULT_WRITE_ATTEMPTS;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "config.json";

/// State file name
const STATE_FILE_NAME: &str = "state.json";

/// Directory name under the platform config and data dirs
const APP_DIR_NAME: &str = "pinlock";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "PINLOCK_CONFIG";

/// Guard configuration that persists across runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    /// Path of the persisted state document
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Idle-check cadence in seconds
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Write attempts before a state change is reported as failed
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(STATE_FILE_NAME)
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL.as_secs()
}

fn default_write_attempts() -> u32 {
    DEFAULT_WRITE_ATTEMPTS
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            tick_interval_secs: default_tick_interval_secs(),
            write_attempts: default_write_attempts(),
        }
    }
}

impl GuardConfig {
    /// Config file location, honouring `PINLOCK_CONFIG`
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, writing defaults if nothing is there
    pub fn load_or_init() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            return Self::load(&path);
        }

        let config = Self::default();
        if let Err(e) = config.save(&path) {
            // Still usable without a config file on disk
            tracing::warn!("Failed to write default config: {}", e);
        }
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, contents).map_err(|e| ConfigError::Io(e.to_string()))?;

        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.tick_interval_secs, 60);
        assert_eq!(config.write_attempts, 3);
        assert!(config.state_path.ends_with("pinlock/state.json"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("conf").join("config.json");

        let config = GuardConfig {
            state_path: temp_dir.path().join("state.json"),
            tick_interval_secs: 5,
            write_attempts: 1,
        };
        config.save(&path).unwrap();

        assert_eq!(GuardConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"tickIntervalSecs": 10}"#).unwrap();

        let config = GuardConfig::load(&path).unwrap();
        assert_eq!(config.tick_interval_secs, 10);
        assert_eq!(config.write_attempts, DEFAULT_WRITE_ATTEMPTS);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{").unwrap();

        assert!(matches!(
            GuardConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_tick_clamped() {
        let config = GuardConfig {
            tick_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
