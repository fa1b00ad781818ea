pub mod duration;
pub mod env;

pub use duration::parse_duration;
pub use env::{apply_env_overrides, apply_overrides};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "APP_CONFIG";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Per-client rate limiter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Sustained requests per second per client
    #[serde(default = "default_rps")]
    pub rps: f64,
    /// Bucket capacity (max requests in an instant)
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// How often fully refilled client buckets are swept away
    #[serde(
        default = "default_eviction_interval",
        deserialize_with = "duration::deserialize"
    )]
    pub eviction_interval: Duration,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_rps() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    10
}

fn default_eviction_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            rps: default_rps(),
            burst: default_burst(),
            eviction_interval: default_eviction_interval(),
        }
    }
}

impl RateLimitConfig {
    /// Reject settings the limiter cannot run with. A disabled limiter is always valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if !self.rps.is_finite() || self.rps <= 0.0 {
            return Err(ConfigError::InvalidRate(self.rps));
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidBurst);
        }
        if self.eviction_interval.is_zero() {
            return Err(ConfigError::InvalidEvictionInterval);
        }
        Ok(())
    }
}

/// Cross-origin settings for browser front ends
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Preflight cache lifetime (seconds)
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: u64,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_max_age_seconds() -> u64 {
    300
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            max_age_seconds: default_max_age_seconds(),
        }
    }
}

/// Configuration errors
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigError {
    /// rps must be a finite number greater than zero
    InvalidRate(f64),
    /// burst must allow at least one request
    InvalidBurst,
    /// eviction interval must be non-zero
    InvalidEvictionInterval,
    /// Duration string could not be parsed
    InvalidDuration(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidRate(rps) => {
                write!(f, "rate_limit.rps must be finite and greater than 0 (got {})", rps)
            }
            ConfigError::InvalidBurst => write!(f, "rate_limit.burst must be at least 1"),
            ConfigError::InvalidEvictionInterval => {
                write!(f, "rate_limit.eviction_interval must be greater than 0")
            }
            ConfigError::InvalidDuration(s) => write!(f, "invalid duration '{}'", s),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Resolve the effective configuration: optional file, then environment overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config);
    config
        .rate_limit
        .validate()
        .context("Invalid rate limiter configuration")?;
    Ok(config)
}
