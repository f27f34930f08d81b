//! Retry logic with exponential backoff for transient provider errors.

use crate::context::CancellationToken;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration for provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Execute a provider call with retry logic.
///
/// Transient errors are retried with exponential backoff until the policy's
/// attempt budget runs out; anything else is returned immediately. Backoff
/// sleeps end early if `cancel` fires, returning the last error.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() || attempt + 1 >= max_attempts {
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt);
                log::warn!(
                    "{}: attempt {}/{} failed: {}. Retrying in {:.1}s",
                    label,
                    attempt + 1,
                    max_attempts,
                    e,
                    delay.as_secs_f64()
                );

                if !cancel.sleep(delay) {
                    return Err(e);
                }
                attempt += 1;
            }
        }
    }
}
