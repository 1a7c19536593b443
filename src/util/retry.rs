//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BotError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    #[serde(with = "crate::util::serde_duration_ms")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    #[serde(with = "crate::util::serde_duration_ms")]
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Reject policies that cannot produce a sane wait. `name` prefixes the
    /// error message.
    pub fn validate(&self, name: &str) -> Result<(), BotError> {
        let problem = if self.max_attempts == 0 {
            Some("max_attempts must be greater than zero")
        } else if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            Some("multiplier must be a finite number of at least 1.0")
        } else if self.max_backoff < self.initial_backoff {
            Some("max_backoff must not be shorter than initial_backoff")
        } else {
            None
        };
        match problem {
            Some(problem) => Err(BotError::Configuration(format!("{name}.{problem}"))),
            None => Ok(()),
        }
    }

    /// Execute an async operation, retrying errors that report `is_retryable`.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, BotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BotError>>,
    {
        self.execute_if(operation, BotError::is_retryable).await
    }

    /// Execute an async operation, retrying only errors accepted by `should_retry`.
    ///
    /// A `retry_after_ms` hint on the error replaces the computed backoff for
    /// that wait.
    pub async fn execute_if<F, Fut, T, P>(
        &self,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, BotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BotError>>,
        P: Fn(&BotError) -> bool,
    {
        if self.max_attempts == 0 {
            return Err(BotError::InvalidState(
                "retry policy allows zero attempts".to_string(),
            ));
        }

        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= self.max_attempts || !should_retry(&error) {
                return Err(error);
            }

            let wait = error
                .retry_after_ms()
                .map(Duration::from_millis)
                .unwrap_or_else(|| jittered(self.delay_before(attempt)));
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %error,
                "operation failed, retrying"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    /// Un-jittered wait after the given 1-based failed attempt.
    fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Scale `base` by a factor drawn from [0.75, 1.25).
fn jittered(base: Duration) -> Duration {
    base.mul_f64(0.75 + unit_noise() * 0.5)
}

/// Cheap noise in [0, 1) from the clock and the thread id.
fn unit_noise() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    (nanos, std::thread::current().id()).hash(&mut hasher);
    (hasher.finish() % 1024) as f64 / 1024.0
}
