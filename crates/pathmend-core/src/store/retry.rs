//! Retry with exponential backoff and jitter for store calls.
//!
//! Only errors for which [`PathmendError::is_retryable`] holds are retried.

use crate::config::StoreConfig;
use crate::{PathmendError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: StoreConfig::MAX_RETRY_ATTEMPTS,
            base_delay: StoreConfig::RETRY_BASE_DELAY,
            max_delay: StoreConfig::RETRY_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed): base * 2^attempt,
    /// capped, optionally scaled by a random factor in [0.5, 1.5).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2f64.powi(attempt.min(30) as i32);
        let capped_secs = (self.base_delay.as_secs_f64() * multiplier)
            .min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts are exhausted.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} attempts", what, attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt + 1 >= config.max_attempts => {
                warn!(
                    "{}: all {} attempts exhausted. Last error: {}",
                    what, config.max_attempts, e
                );
                return Err(exhausted(e));
            }
            Err(e) => {
                let delay = config.calculate_delay(attempt);
                warn!(
                    "{}: attempt {}/{} failed: {}. Retrying in {:?}",
                    what,
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retries are spent; callers further up must not retry again.
fn exhausted(err: PathmendError) -> PathmendError {
    match err {
        PathmendError::Transport { message, .. } => PathmendError::Transport {
            message,
            retryable: false,
        },
        other => other,
    }
}
