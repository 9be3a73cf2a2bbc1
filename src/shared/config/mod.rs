//! Synchronization configuration
//!
//! Tunables of the offline queue: retry ceiling, backoff window, submission
//! timeout, lock staleness and partition parallelism.
//!
//! Configuration can be built in code through [`SyncConfig::builder`] or read
//! from a TOML document whose durations are given in milliseconds:
//!
//! ```toml
//! max_attempts = 5
//! backoff_base_ms = 1000
//! backoff_max_ms = 300000
//! submit_timeout_ms = 10000
//! lock_stale_after_ms = 60000
//! ```

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Attempts before a record becomes terminal
    pub max_attempts: u32,
    /// First backoff step; retry `n` waits `backoff_base * 2^n`
    pub backoff_base: Duration,
    /// Upper bound of a single backoff wait
    pub backoff_max: Duration,
    /// Deadline of a single remote submission
    pub submit_timeout: Duration,
    /// Age after which another context's sync lock is considered abandoned
    pub lock_stale_after: Duration,
    /// How often a waiting context re-checks a lock held elsewhere
    pub lock_poll_interval: Duration,
    /// Entity partitions drained concurrently within one pass
    pub max_parallel_partitions: usize,
    /// Capacity of the trigger channel
    pub trigger_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            submit_timeout: Duration::from_secs(10),
            lock_stale_after: Duration::from_secs(60),
            lock_poll_interval: Duration::from_millis(250),
            max_parallel_partitions: 4,
            trigger_buffer: 16,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::OutOfRange("max_attempts must be at least 1"));
        }
        if self.max_parallel_partitions == 0 {
            return Err(ConfigError::OutOfRange(
                "max_parallel_partitions must be at least 1",
            ));
        }
        if self.trigger_buffer == 0 {
            return Err(ConfigError::OutOfRange("trigger_buffer must be at least 1"));
        }
        if self.backoff_max < self.backoff_base {
            return Err(ConfigError::OutOfRange(
                "backoff_max must not be smaller than backoff_base",
            ));
        }
        if self.submit_timeout.is_zero() {
            return Err(ConfigError::OutOfRange("submit_timeout must be positive"));
        }
        if self.lock_stale_after <= self.submit_timeout {
            return Err(ConfigError::OutOfRange(
                "lock_stale_after must exceed submit_timeout",
            ));
        }
        Ok(())
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let raw: RawSyncConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        raw.into_builder().build()
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config.backoff_base = base;
        self.config.backoff_max = max;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    pub fn lock_stale_after(mut self, after: Duration) -> Self {
        self.config.lock_stale_after = after;
        self
    }

    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.config.lock_poll_interval = interval;
        self
    }

    pub fn max_parallel_partitions(mut self, partitions: usize) -> Self {
        self.config.max_parallel_partitions = partitions;
        self
    }

    pub fn trigger_buffer(mut self, capacity: usize) -> Self {
        self.config.trigger_buffer = capacity;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// On-disk shape of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSyncConfig {
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    submit_timeout_ms: Option<u64>,
    lock_stale_after_ms: Option<u64>,
    lock_poll_interval_ms: Option<u64>,
    max_parallel_partitions: Option<usize>,
    trigger_buffer: Option<usize>,
}

impl RawSyncConfig {
    fn into_builder(self) -> SyncConfigBuilder {
        let defaults = SyncConfig::default();
        let ms = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        SyncConfig::builder()
            .max_attempts(self.max_attempts.unwrap_or(defaults.max_attempts))
            .backoff(
                ms(self.backoff_base_ms, defaults.backoff_base),
                ms(self.backoff_max_ms, defaults.backoff_max),
            )
            .submit_timeout(ms(self.submit_timeout_ms, defaults.submit_timeout))
            .lock_stale_after(ms(self.lock_stale_after_ms, defaults.lock_stale_after))
            .lock_poll_interval(ms(self.lock_poll_interval_ms, defaults.lock_poll_interval))
            .max_parallel_partitions(
                self.max_parallel_partitions
                    .unwrap_or(defaults.max_parallel_partitions),
            )
            .trigger_buffer(self.trigger_buffer.unwrap_or(defaults.trigger_buffer))
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    #[error("could not parse configuration: {0}")]
    Parse(String),
}
