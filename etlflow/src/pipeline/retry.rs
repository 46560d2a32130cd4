//! Retry wrapper with exponential backoff.
//!
//! Extract and load run through [`with_retry`]; transforms never do.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How often, and how patiently, to retry a fallible stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Base delay in seconds; retry `k` waits `backoff_seconds * 2^(k-1)`.
    pub backoff_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff_seconds: f64) -> Self {
        Self {
            max_attempts,
            backoff_seconds,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(1, 0.0)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub const fn with_backoff_seconds(mut self, seconds: f64) -> Self {
        self.backoff_seconds = seconds;
        self
    }

    /// Checks the policy bounds.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated bound.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err(format!(
                "retry.max_attempts must be at least 1, got {}",
                self.max_attempts
            ));
        }
        if !self.backoff_seconds.is_finite() || self.backoff_seconds < 0.0 {
            return Err(format!(
                "retry.backoff_seconds must be a non-negative number, got {}",
                self.backoff_seconds
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1 for the first retry).
    #[must_use]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = (self.backoff_seconds * 2f64.powi(exponent)).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// All delays a persistently failing action would see, in order.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts.max(1))
            .map(|retry| self.delay_before_retry(retry))
            .collect()
    }
}

/// The last error of an action that failed on every attempt.
#[derive(Debug, Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryExhausted<E> {
    /// Attempts made, equal to the policy's `max_attempts`.
    pub attempts: u32,
    /// The error of the final attempt.
    #[source]
    pub error: E,
}

impl<E> RetryExhausted<E> {
    /// Unwraps the final error.
    pub fn into_inner(self) -> E {
        self.error
    }
}

/// Runs `action` until it succeeds or `policy.max_attempts` is reached.
///
/// Sleeps `policy.delay_before_retry(k)` before retry `k`. Each failed
/// attempt is logged at `warn`; exhaustion is logged at `error`.
///
/// # Errors
///
/// Returns [`RetryExhausted`] wrapping the final attempt's error.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut action: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match action().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt >= max_attempts => {
                tracing::error!(
                    label,
                    attempts = attempt,
                    error = %error,
                    "Failed after all attempts"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay = policy.delay_before_retry(attempt);
                tracing::warn!(
                    label,
                    attempt,
                    max_attempts,
                    error = %error,
                    delay_secs = delay.as_secs_f64(),
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
