//! coopvm configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (COOPVM_*)
//! 3. User-level (~/.config/coopvm/config.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use coopvm::util::config::load_host_config;
//!
//! let config = load_host_config().unwrap();
//! println!("memory: {} bytes", config.runtime.memory_size);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::scheduler::SnapshotPolicy;
use crate::util::logger::LogLevel;
use crate::vm::program::DEFAULT_EXTENSION;

/// Host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Data memory per context (bytes)
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    /// Suffix tried when a path fails to load
    #[serde(default = "default_extension")]
    pub default_extension: String,
    /// When the idle phase takes context snapshots
    #[serde(default)]
    pub snapshot_policy: SnapshotPolicy,
}

fn default_memory_size() -> usize {
    16 * 1024
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_size: default_memory_size(),
            default_extension: default_extension(),
            snapshot_policy: SnapshotPolicy::default(),
        }
    }
}

/// Log settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Config serialize error: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("coopvm"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("coopvm"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("coopvm"));
    }

    None
}

/// Get the user config file path (~/.config/coopvm/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

impl HostConfig {
    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(
        &self,
        path: &Path,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `COOPVM_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `COOPVM_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("COOPVM_MEMORY_SIZE") {
            self.runtime.memory_size =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "COOPVM_MEMORY_SIZE",
                        value,
                    })?;
        }
        if let Some(value) = lookup("COOPVM_DEFAULT_EXTENSION") {
            self.runtime.default_extension = value.trim_start_matches('.').to_string();
        }
        if let Some(value) = lookup("COOPVM_SNAPSHOT_POLICY") {
            self.runtime.snapshot_policy =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "COOPVM_SNAPSHOT_POLICY",
                        value,
                    })?;
        }
        if let Some(value) = lookup("COOPVM_LOG") {
            self.log.level = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "COOPVM_LOG",
                value,
            })?;
        }
        Ok(())
    }
}

/// Load the user-level configuration with environment overrides applied.
pub fn load_host_config() -> Result<HostConfig, ConfigError> {
    let mut config = match get_config_path() {
        Some(path) => HostConfig::load(&path)?,
        None => HostConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

#[cfg(test)]
mod tests;
