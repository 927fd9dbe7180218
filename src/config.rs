//! Configuration loading and persistence.
//!
//! Reads `<config_dir>/cellport/config.json`, then applies `CELLPORT_*`
//! environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_MAX_CONTROL_TRANSFER};

/// Configuration for the cellport CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// AT command port device path.
    pub at_port: PathBuf,
    /// MBIM control channel device path.
    pub mbim_port: PathBuf,
    /// Max control transfer advertised in MBIM OPEN.
    pub max_control_transfer: u32,
    /// Seconds a synchronous command may wait for its answer (0 = forever).
    pub command_timeout: u64,
    /// Access point used by `connect` when none is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apn: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            at_port: PathBuf::from("/dev/ttyACM0"),
            mbim_port: PathBuf::from("/dev/cdc-wdm0"),
            max_control_transfer: DEFAULT_MAX_CONTROL_TRANSFER,
            command_timeout: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            apn: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `CELLPORT_CONFIG_DIR` overrides the platform config dir.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match std::env::var("CELLPORT_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("Could not determine config directory")?
                .join("cellport"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file means defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CELLPORT_AT_PORT") {
            self.at_port = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("CELLPORT_MBIM_PORT") {
            self.mbim_port = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("CELLPORT_MAX_CONTROL_TRANSFER") {
            match max.parse::<u32>() {
                Ok(max) => self.max_control_transfer = max,
                Err(_) => log::warn!("Ignoring CELLPORT_MAX_CONTROL_TRANSFER={max}"),
            }
        }

        if let Ok(timeout) = std::env::var("CELLPORT_COMMAND_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.command_timeout = secs,
                Err(_) => log::warn!("Ignoring CELLPORT_COMMAND_TIMEOUT={timeout}"),
            }
        }

        if let Ok(apn) = std::env::var("CELLPORT_APN") {
            self.apn = Some(apn);
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }

    /// Command deadline; `None` when configured as 0.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout > 0).then(|| Duration::from_secs(self.command_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mbim_port, PathBuf::from("/dev/cdc-wdm0"));
        assert_eq!(config.max_control_transfer, 4096);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert!(config.apn.is_none());
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let config = Config {
            command_timeout: 0,
            ..Config::default()
        };
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "apn": "internet", "max_control_transfer": 512 }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.apn.as_deref(), Some("internet"));
        assert_eq!(config.max_control_transfer, 512);
        assert_eq!(config.at_port, PathBuf::from("/dev/ttyACM0"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_serialization_omits_unset_apn() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(!json.contains("apn"));
        assert!(json.contains("cdc-wdm0"));
    }
}
