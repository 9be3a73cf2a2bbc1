//! # Retry Logic and Backoff Strategies
//!
//! Decides what happens to a record after a failed synchronization attempt:
//! another attempt after a backoff wait, or terminal failure once the retry
//! ceiling is reached.
//!
//! A record that has failed `n` times waits at least `base * 2^n` (capped at
//! `max`) before it is eligible again.
//!
//! ## Usage
//!
//! ```rust
//! use booking_sync::client::offline::retry::{BackoffStrategy, RetryDecision, RetryPolicy};
//! use chrono::Utc;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, BackoffStrategy::exponential(Duration::from_secs(1), Duration::from_secs(60)));
//! match policy.decide(0, Utc::now()) {
//!     RetryDecision::Retry { attempt, .. } => assert_eq!(attempt, 1),
//!     RetryDecision::GiveUp { .. } => unreachable!(),
//! }
//! ```

use crate::shared::config::SyncConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Doubling backoff, capped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffStrategy {
    /// Wait after the first failure is `2 * base`
    base: Duration,
    /// Longest single wait
    max: Duration,
}

impl BackoffStrategy {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Wait before the next attempt of a record that has failed `attempt` times
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }
}

/// What to do with a record after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once `next_attempt_at` has passed
    Retry {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Retry ceiling reached
    GiveUp {
        attempt: u32,
    },
}

/// Retry ceiling plus backoff strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which a record becomes terminal
    max_attempts: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.max_attempts,
            BackoffStrategy::exponential(config.backoff_base, config.backoff_max),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide the fate of a record that had `previous_attempts` failures
    /// before the one that just happened
    pub fn decide(&self, previous_attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        let attempt = previous_attempts.saturating_add(1);
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp { attempt };
        }

        let delay = self.backoff.delay(attempt);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        RetryDecision::Retry {
            attempt,
            next_attempt_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
