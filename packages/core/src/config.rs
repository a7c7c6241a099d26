//! Worker configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ENV_RATE_LIMIT_COUNT: &str = "INVITE_RATE_LIMIT_COUNT";
pub const ENV_RATE_LIMIT_WINDOW_SECS: &str = "INVITE_RATE_LIMIT_WINDOW_SECS";
pub const ENV_SHUTDOWN_GRACE_SECS: &str = "INVITE_SHUTDOWN_GRACE_SECS";

/// Configuration for the join worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum admissions inside one trailing window.
    pub rate_limit_count: usize,
    /// Length of the sliding window (seconds).
    pub rate_limit_window_secs: u64,
    /// How long shutdown waits for the in-flight job before aborting the worker (seconds).
    pub shutdown_grace_secs: u64,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            rate_limit_count: 5,
            rate_limit_window_secs: 10,
            shutdown_grace_secs: 5,
            event_capacity: 256,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INVITE_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_RATE_LIMIT_COUNT) {
            self.rate_limit_count = parse_var(ENV_RATE_LIMIT_COUNT, &value)?;
        }
        if let Some(value) = lookup(ENV_RATE_LIMIT_WINDOW_SECS) {
            self.rate_limit_window_secs = parse_var(ENV_RATE_LIMIT_WINDOW_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_SHUTDOWN_GRACE_SECS) {
            self.shutdown_grace_secs = parse_var(ENV_SHUTDOWN_GRACE_SECS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the limiter settings can admit anything at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_count == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit_count must be at least 1".into(),
            ));
        }
        if self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit_window_secs must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for {key}")]
    Env { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
