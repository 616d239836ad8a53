//! Configuration for the chainchat CLI, stored as TOML.
//!
//! Default location: `<config_dir>/chainchat/config.toml` as reported by
//! `directories` (e.g. `~/.config/chainchat/config.toml` on Linux).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chainchat_core::{Backoff, PipelineConfig, RetryPolicy};
use chainchat_crypto::KeyDerivation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration.
///
/// ```toml
/// [keys]
/// # dir = "/path/to/keys"  # omitted = <data_dir>/keys
///
/// [crypto]
/// key_derivation = "raw_x"  # "raw_x" | "sha256_coordinates"
///
/// [retry]
/// max_attempts = 4
/// base_delay_ms = 1000
/// max_delay_ms = 30000
/// backoff = "linear"  # "linear" | "exponential"
///
/// [group]
/// fanout_delay_ms = 0
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub crypto: CryptoConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub group: GroupConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Directory holding `<username>.key` files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CryptoConfig {
    #[serde(default)]
    pub key_derivation: KeyDerivation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Delay between successive group deliveries
    #[serde(default)]
    pub fanout_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Missing default file means defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chainchat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chainchat")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write this config to `path` unless a file is already there.
    /// Returns whether a file was written.
    pub fn save_if_missing(&self, path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        if let Some(dir) = &self.keys.dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "keys.dir must not be empty; omit it to use the default".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Key directory: configured, else `<data_dir>/keys`, else `./keys`.
    pub fn keys_dir(&self) -> PathBuf {
        self.keys
            .dir
            .clone()
            .or_else(|| Self::data_dir().map(|d| d.join("keys")))
            .unwrap_or_else(|| PathBuf::from("keys"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff: self.retry.backoff,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            key_derivation: self.crypto.key_derivation,
            retry: self.retry_policy(),
            fanout_delay: Duration::from_millis(self.group.fanout_delay_ms),
        }
    }
}
