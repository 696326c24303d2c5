//! Exponential backoff for capture attempts

use std::time::Duration;

use crate::error::StreamError;

/// Bounded exponential backoff.
///
/// The delay after failed attempt `n` (counting from 0) is
/// `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per capture task
    /// Default: 5
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    /// Default: 2 seconds
    pub base_delay: Duration,

    /// Upper bound for any delay
    /// Default: 2 minutes
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Backoff to wait after the given zero-based attempt failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.max_attempts == 0 {
            return Err(StreamError::Configuration(
                "Max capture attempts must be at least 1".to_string(),
            ));
        }

        if self.base_delay > self.max_delay {
            return Err(StreamError::Configuration(
                "Invalid retry delay: base must not exceed max".to_string(),
            ));
        }

        Ok(())
    }
}
