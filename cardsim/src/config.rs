//! Simulator configuration
//!
//! Passed explicitly to the session manager. Nothing is written to disk
//! unless [`SimulatorConfig::save`] is called.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// User-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Free text copied into every new session (student name, group, ...)
    #[serde(default)]
    pub user_info: String,
    /// Directory for session snapshots; None keeps sessions in memory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

impl SimulatorConfig {
    const CONFIG_FILE: &'static str = "user_config.json";

    /// Get the default configuration directory
    pub fn default_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("CARDSIM_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(config) = dirs::config_dir() {
            return config.join("cardsim");
        }
        PathBuf::from("config")
    }

    /// Default configuration file path
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join(Self::CONFIG_FILE)
    }

    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Read a configuration file, falling back to defaults
    ///
    /// A missing file is normal; an unreadable one is logged.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Write the configuration file, creating its directory
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }
}
