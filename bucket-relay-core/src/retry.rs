//! Exponential backoff around remote calls.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::contract::{BoxError, Sleeper};

/// Attempt budget and backoff base for remote operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Seconds; the wait after failed attempt `n` is `backoff_base ^ n`.
    pub backoff_base: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: f64) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    /// Wait inserted after the given failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_base.powi(exponent);
        if secs.is_finite() && secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else if secs.is_infinite() {
            Duration::MAX
        } else {
            Duration::ZERO
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base_secs)
    }
}

/// Every attempt failed.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryError {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub last_error: BoxError,
}

/// Retries any remote operation under one [`RetryPolicy`], sleeping through the
/// injected [`Sleeper`] between attempts.
pub struct RetryableTransfer<'a, S: Sleeper> {
    policy: RetryPolicy,
    sleeper: &'a S,
}

impl<'a, S: Sleeper> RetryableTransfer<'a, S> {
    pub fn new(policy: RetryPolicy, sleeper: &'a S) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// `operation` is invoked at most `max_attempts` times (at least once). No
    /// wait follows the final failure.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = label, attempt, "[RETRY] Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "[RETRY] Attempt failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        operation = label,
                        attempts = attempt,
                        error = %e,
                        "[RETRY] Attempts exhausted"
                    );
                    return Err(RetryError {
                        operation: label.to_owned(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}
