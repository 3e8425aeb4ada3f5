// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry strategies for failed steps.
//!
//! A strategy is a single capability: given the attempt that just failed and
//! its error, return the delay before the next attempt, or `None` when the
//! step should fail for good. Closures implement it directly.
//!
//! ```ignore
//! let config = StepConfig::new().with_retry_strategy(|attempt: u32, _err: &ErrorObject| {
//!     (attempt < 3).then(|| Duration::from_secs(10))
//! });
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ErrorObject;

/// Decides whether and when a failed step is retried.
pub trait RetryStrategy: Send + Sync {
    /// Delay before the attempt after `attempt` (1-based), or `None` when exhausted.
    fn compute_delay(&self, attempt: u32, error: &ErrorObject) -> Option<Duration>;
}

impl<F> RetryStrategy for F
where
    F: Fn(u32, &ErrorObject) -> Option<Duration> + Send + Sync,
{
    fn compute_delay(&self, attempt: u32, error: &ErrorObject) -> Option<Duration> {
        self(attempt, error)
    }
}

/// Never retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn compute_delay(&self, _attempt: u32, _error: &ErrorObject) -> Option<Duration> {
        None
    }
}

/// Retry with the same delay every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn compute_delay(&self, attempt: u32, _error: &ErrorObject) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.delay)
    }
}

/// Randomisation applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterStrategy {
    /// Use the computed delay as is.
    None,
    /// Uniform in `[0, delay]`.
    #[default]
    Full,
    /// Uniform in `[delay / 2, delay]`.
    Half,
}

impl JitterStrategy {
    fn apply(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis().min(u64::MAX as u128) as u64;
        match self {
            JitterStrategy::None => delay,
            JitterStrategy::Full => Duration::from_millis(fastrand::u64(0..=millis)),
            JitterStrategy::Half => {
                let half = millis / 2;
                Duration::from_millis(half + fastrand::u64(0..=millis - half))
            }
        }
    }
}

/// Exponential backoff: `initial_delay * backoff_rate^(attempt-1)`, capped at
/// `max_delay`, jittered, and never below one second.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_rate: f64,
    pub jitter: JitterStrategy,
    /// Error types that fail the step immediately.
    pub non_retryable: HashSet<String>,
}

/// Lower bound for any backoff delay.
pub const MIN_BACKOFF_DELAY: Duration = Duration::from_secs(1);

impl ExponentialBackoff {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_rate(mut self, backoff_rate: f64) -> Self {
        self.backoff_rate = backoff_rate;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Fail immediately on errors of this type.
    pub fn with_non_retryable(mut self, error_type: impl Into<String>) -> Self {
        self.non_retryable.insert(error_type.into());
        self
    }

    /// Un-jittered delay after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay.as_secs_f64() * self.backoff_rate.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_rate: 2.0,
            jitter: JitterStrategy::Full,
            non_retryable: HashSet::new(),
        }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn compute_delay(&self, attempt: u32, error: &ErrorObject) -> Option<Duration> {
        if attempt >= self.max_attempts || self.non_retryable.contains(&error.error_type) {
            return None;
        }
        let delay = self.jitter.apply(self.delay_for_attempt(attempt));
        Some(delay.max(MIN_BACKOFF_DELAY))
    }
}

/// Named retry presets.
pub struct RetryPresets;

impl RetryPresets {
    /// 6 attempts, 5s initial delay doubling up to 60s, full jitter.
    pub fn default_preset() -> Arc<dyn RetryStrategy> {
        Arc::new(ExponentialBackoff::default())
    }

    pub fn no_retry() -> Arc<dyn RetryStrategy> {
        Arc::new(NoRetry)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Arc<dyn RetryStrategy> {
        Arc::new(FixedDelay::new(max_attempts, delay))
    }
}
