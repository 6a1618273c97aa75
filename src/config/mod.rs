//! # Scribe Configuration
//!
//! Typed configuration for the tree store, the publish orchestrator and the
//! event publisher. Every field has a default, so an empty source yields a
//! working configuration; [`ConfigManager`] layers files and environment
//! overrides on top.
//!
//! ```rust,no_run
//! use scribe_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().publish.poll_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring scribe.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScribeConfig {
    /// Publish job polling, backoff and timeouts
    pub publish: PublishConfig,

    /// Chapter hierarchy limits
    pub tree: TreeConfig,

    /// Lifecycle event fan-out
    pub events: EventsConfig,
}

impl ScribeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.publish.validate()?;
        self.events.validate()
    }
}

/// Publish orchestrator settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Delay between builder status polls while healthy
    pub poll_interval_ms: u64,
    /// Upper bound on the delay after consecutive poll failures
    pub max_poll_backoff_ms: u64,
    /// Growth factor of the poll delay per consecutive failure
    pub backoff_multiplier: f64,
    /// Consecutive failed polls after which the job fails
    pub max_consecutive_poll_failures: u32,
    /// Wall-clock budget for a job in `running`
    pub running_timeout_seconds: u64,
    /// Budget for a single builder submit (and cancel) call
    pub submit_timeout_seconds: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            max_poll_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            max_consecutive_poll_failures: 5,
            running_timeout_seconds: 30 * 60,
            submit_timeout_seconds: 30,
        }
    }
}

impl PublishConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.max_poll_backoff_ms)
    }

    pub fn running_timeout(&self) -> Duration {
        Duration::from_secs(self.running_timeout_seconds)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "publish.poll_interval_ms",
                self.poll_interval_ms,
                "must be greater than zero",
            ));
        }
        if self.max_poll_backoff_ms < self.poll_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "publish.max_poll_backoff_ms",
                self.max_poll_backoff_ms,
                "must not be smaller than poll_interval_ms",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "publish.backoff_multiplier",
                self.backoff_multiplier,
                "must be a finite number >= 1.0",
            ));
        }
        if self.max_consecutive_poll_failures == 0 {
            return Err(ConfigurationError::invalid_value(
                "publish.max_consecutive_poll_failures",
                self.max_consecutive_poll_failures,
                "must be at least 1",
            ));
        }
        if self.running_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "publish.running_timeout_seconds",
                self.running_timeout_seconds,
                "must be greater than zero",
            ));
        }
        if self.submit_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "publish.submit_timeout_seconds",
                self.submit_timeout_seconds,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Chapter hierarchy settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Deepest `level` a chapter may sit at; unbounded when absent
    pub max_level: Option<u32>,
}

/// Lifecycle event settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

impl EventsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                self.channel_capacity,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
