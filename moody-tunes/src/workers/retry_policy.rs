//! Retry policy for failed background tasks
//!
//! Exponential backoff with a cap. Only provider and client faults are
//! retried; a provider `Retry-After` longer than the computed delay wins.

use crate::config::RuntimeSettings;
use moody_common::Error;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt before permanent failure
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    /// Cap for exponential growth
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Playlist export: long initial delay so provider incidents can clear
    pub fn export(settings: &RuntimeSettings) -> Self {
        Self {
            max_retries: settings.export_max_retries,
            initial_backoff_secs: settings.export_retry_delay_secs,
            max_backoff_secs: settings.export_retry_delay_secs.saturating_mul(4),
            backoff_multiplier: 2.0,
        }
    }

    /// Total attempts allowed, first run included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Backoff after the `retry_count`-th failure (0-based)
    pub fn backoff_secs(&self, retry_count: u32) -> u64 {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64) as u64
    }

    /// Delay before the next attempt, honouring a provider hint
    pub fn delay_for(&self, error: &Error, retry_count: u32) -> Duration {
        let computed = Duration::from_secs(self.backoff_secs(retry_count));
        match error.retry_after() {
            Some(hint) if hint > computed => hint,
            _ => computed,
        }
    }

    /// `attempts` counts runs already started, including the failed one
    pub fn should_retry(&self, error: &Error, attempts: u32) -> bool {
        error.is_retryable() && attempts < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_secs: 60,
            max_backoff_secs: 3600,
            backoff_multiplier: 2.0,
        }
    }
}
