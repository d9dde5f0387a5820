//! # Queue Configuration
//!
//! Fixed at start; there is no hot reload.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_QUEUE_CAPACITY=1000                                          │
//! │     TALLY_WORKER_COUNT=20                                              │
//! │                                                                         │
//! │  2. TOML (QueueConfig::from_toml_str)                                  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## TOML Format
//! ```toml
//! queue_capacity = 1000
//! worker_count = 20
//! shutdown_grace_secs = 5
//! caller_timeout_secs = 30
//! background_workers = 2
//! background_backlog = 256
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

pub const ENV_QUEUE_CAPACITY: &str = "TALLY_QUEUE_CAPACITY";
pub const ENV_WORKER_COUNT: &str = "TALLY_WORKER_COUNT";
pub const ENV_SHUTDOWN_GRACE_SECS: &str = "TALLY_SHUTDOWN_GRACE_SECS";
pub const ENV_CALLER_TIMEOUT_SECS: &str = "TALLY_CALLER_TIMEOUT_SECS";
pub const ENV_BACKGROUND_WORKERS: &str = "TALLY_BACKGROUND_WORKERS";
pub const ENV_BACKGROUND_BACKLOG: &str = "TALLY_BACKGROUND_BACKLOG";

/// Settings for [`crate::BillQueueService`] and its helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of requests waiting in the channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of workers processing bills in parallel.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// How long shutdown waits for each worker before abandoning it.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// How long the caller adapter waits for a result.
    #[serde(default = "default_caller_timeout")]
    pub caller_timeout_secs: u64,

    /// Tasks running best-effort background jobs (request logging).
    #[serde(default = "default_background_workers")]
    pub background_workers: usize,

    /// Background jobs that may wait before new ones are dropped.
    #[serde(default = "default_background_backlog")]
    pub background_backlog: usize,
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_worker_count() -> usize {
    20
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_caller_timeout() -> u64 {
    30
}

fn default_background_workers() -> usize {
    2
}

fn default_background_backlog() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            shutdown_grace_secs: default_shutdown_grace(),
            caller_timeout_secs: default_caller_timeout(),
            background_workers: default_background_workers(),
            background_backlog: default_background_backlog(),
        }
    }
}

impl QueueConfig {
    /// Loads defaults overridden by `TALLY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: QueueConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, ENV_QUEUE_CAPACITY, &mut self.queue_capacity)?;
        override_with(&lookup, ENV_WORKER_COUNT, &mut self.worker_count)?;
        override_with(&lookup, ENV_SHUTDOWN_GRACE_SECS, &mut self.shutdown_grace_secs)?;
        override_with(&lookup, ENV_CALLER_TIMEOUT_SECS, &mut self.caller_timeout_secs)?;
        override_with(&lookup, ENV_BACKGROUND_WORKERS, &mut self.background_workers)?;
        override_with(&lookup, ENV_BACKGROUND_BACKLOG, &mut self.background_backlog)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than 0".into(),
            ));
        }

        if self.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "worker_count must be greater than 0".into(),
            ));
        }

        if self.shutdown_grace_secs == 0 || self.caller_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "shutdown_grace_secs and caller_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.background_workers == 0 || self.background_backlog == 0 {
            return Err(ConfigError::Invalid(
                "background_workers and background_backlog must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }

    pub fn caller_timeout_secs(mut self, secs: u64) -> Self {
        self.caller_timeout_secs = secs;
        self
    }

    pub fn background(mut self, workers: usize, backlog: usize) -> Self {
        self.background_workers = workers;
        self.background_backlog = backlog;
        self
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn caller_timeout(&self) -> Duration {
        Duration::from_secs(self.caller_timeout_secs)
    }
}

fn override_with<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
        debug!(key, value = %raw, "Overriding queue setting from environment");
    }
    Ok(())
}
