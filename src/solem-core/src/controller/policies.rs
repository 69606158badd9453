// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Retry and polling policies for controller operations.

use std::fmt;
use std::time::Duration;

use crate::controller::retry::Retryable;

/// Policy for retrying failed operations.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Whether to try again after `attempts` failed attempts.
    fn should_retry(&self, attempts: u32, error: &dyn Retryable) -> bool;

    /// Delay before retry number `retry` (0-based).
    fn delay(&self, retry: u32) -> Duration;

    fn max_attempts(&self) -> u32;
}

/// Exponential backoff retry policy.
///
/// The first retry waits `base_delay`; each further retry doubles the wait,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Three attempts, one second apart and doubling.
    pub fn default_commands() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::default_commands()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempts: u32, error: &dyn Retryable) -> bool {
        if attempts >= self.max_attempts || error.is_cancelled() {
            return false;
        }
        error.is_transient()
    }

    fn delay(&self, retry: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Single attempt, no retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _attempts: u32, _error: &dyn Retryable) -> bool {
        false
    }

    fn delay(&self, _retry: u32) -> Duration {
        Duration::ZERO
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}

/// Policy for spacing status polls.
pub trait PollingPolicy: Send + Sync {
    fn interval(&self, watering: bool) -> Duration;
}

/// Polls more often while a valve is open so the end of a run shows up
/// promptly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptivePolling {
    idle_interval: Duration,
    watering_interval: Duration,
}

impl AdaptivePolling {
    pub fn new(idle_interval: Duration, watering_interval: Duration) -> Self {
        Self {
            idle_interval,
            watering_interval,
        }
    }

    pub fn default_controller() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(60))
    }
}

impl Default for AdaptivePolling {
    fn default() -> Self {
        Self::default_controller()
    }
}

impl PollingPolicy for AdaptivePolling {
    fn interval(&self, watering: bool) -> Duration {
        if watering {
            self.watering_interval
        } else {
            self.idle_interval
        }
    }
}
