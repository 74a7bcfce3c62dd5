//! Configuration system for Jupyter Spy
//!
//! Provides:
//! - Config file discovery (explicit path, env var, standard path)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation

use crate::filter::FilterSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default receive timeout for polling capture, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete spy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpyConfig {
    /// General settings
    pub spy: SpySettings,

    /// Capture settings
    pub capture: CaptureSettings,

    /// Output settings
    pub output: OutputSettings,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpySettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for SpySettings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Receive timeout per polling attempt
    pub poll_interval_ms: u64,

    /// Message filters
    #[serde(flatten)]
    pub filter: FilterSettings,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            filter: FilterSettings::default(),
        }
    }
}

impl CaptureSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Pretty print; unset means "pretty only on stdout"
    pub pretty: Option<bool>,

    /// Flush after each message
    pub flush_each: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            pretty: None,
            flush_each: true,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Explicit config path
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Use an explicit config path
    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. explicit path
    /// 2. JSPY_CONFIG environment variable
    /// 3. <config dir>/jupyter-spy/config.toml
    /// 4. Default values
    pub fn load(&self) -> ConfigResult<SpyConfig> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                SpyConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config);
        Self::validate(&config)?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("Config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("JSPY_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("JSPY_CONFIG path does not exist: {}", env_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<SpyConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: SpyConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(config: &mut SpyConfig) {
        if let Ok(val) = std::env::var("JSPY_LOG_LEVEL") {
            config.spy.log_level = val;
        }
        if let Ok(val) = std::env::var("JSPY_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.capture.poll_interval_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("JSPY_FILTER_STATUS") {
            config.capture.filter.filter_status =
                val.parse().unwrap_or(config.capture.filter.filter_status);
        }
        if let Ok(val) = std::env::var("JSPY_PRETTY") {
            if let Ok(pretty) = val.parse() {
                config.output.pretty = Some(pretty);
            }
        }
    }

    fn validate(config: &SpyConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.spy.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.spy.log_level, valid_levels
            )));
        }

        if config.capture.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Poll interval cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("jupyter-spy").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
