//! Configuration management for Courier

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ErrorKind, Result};
use crate::retry::RetryOptions;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_RETRY_INTERVAL: &str = "1s";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

/// Defaults for retrying idempotent requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay between attempts, e.g. "1s" or "500ms"
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Retries after the first attempt; absent means retry forever
    #[serde(default)]
    pub attempts: Option<u32>,
}

fn default_interval() -> String {
    DEFAULT_RETRY_INTERVAL.to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            attempts: None,
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.interval).map_err(|e| {
            ConfigError::InvalidValue {
                field: "retry.interval".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Retry options for requests: connection failures only
    pub fn to_options(&self) -> Result<RetryOptions> {
        Ok(RetryOptions {
            retry_on: vec![ErrorKind::Connection],
            retry_interval: self.interval()?,
            retry_attempts: self.attempts,
        })
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            Ok(Self::default_config())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            retry: RetryConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("api.base_url".to_string()).into());
        }
        let base_url = Url::parse(&self.api.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "api.base_url".to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_string(),
                reason: format!("unsupported scheme '{}', expected http or https", base_url.scheme()),
            }
            .into());
        }
        self.retry.interval()?;
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("COURIER_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("courier").join("config.toml"))
}
