//! Backoff policy applied between download attempts.
//!
//! The number of attempts is owned by the request (`retries`); the policy
//! only decides how long to wait before the next one.

use std::time::Duration;

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How long to pause after a failed attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Retry immediately.
    None,

    /// Constant delay between attempts.
    Fixed { delay: Duration },

    /// Delay grows by `multiplier` after each failure, capped at `max_delay`.
    ExponentialBackoff {
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff with the default constants.
    pub fn exponential() -> Self {
        Self::ExponentialBackoff {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed { delay }
    }

    /// Delay before retry number `retry` (1-based: 1 is the wait after the
    /// first failed attempt).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay } => *delay,
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(exponent);
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                if capped.is_finite() && capped > 0.0 {
                    Duration::from_millis(capped as u64)
                } else {
                    Duration::ZERO
                }
            }
        }
    }
}
