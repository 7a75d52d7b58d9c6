//! Service configuration.
//!
//! Loaded once at startup from a TOML file (or built in code) and treated
//! as immutable afterwards. Every field has a default, so a partial file or
//! no file at all is fine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for the generation service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Number of worker tasks; also the maximum number of requests in the
    /// Running state at once.
    pub worker_concurrency: usize,

    /// Per-stage wall-clock budget. A capability exceeding it fails the
    /// request with a timeout.
    pub stage_timeout_secs: u64,

    /// Idle-worker wake-up fallback when queue notifications coalesce.
    pub poll_interval_ms: u64,

    /// Events kept per request for late subscribers.
    pub replay_buffer_capacity: usize,

    /// Buffered events per observer channel before non-terminal events are
    /// dropped for that observer.
    pub observer_buffer_capacity: usize,

    /// Terminal request records kept queryable before eviction.
    pub max_retained_terminal: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 2,
            stage_timeout_secs: 120,
            poll_interval_ms: 500,
            replay_buffer_capacity: 64,
            observer_buffer_capacity: 32,
            max_retained_terminal: 256,
        }
    }
}

impl ServiceConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string. Missing fields
    /// take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker_concurrency must be at least 1".to_string(),
            ));
        }
        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "stage_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.replay_buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "replay_buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.observer_buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "observer_buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_retained_terminal == 0 {
            return Err(ConfigError::Invalid(
                "max_retained_terminal must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
