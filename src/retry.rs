//! Bounded retry with exponential backoff for outbound calls.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::{info, warn};

/// Cap on a single wait.
const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// What to do with a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure (rate limit, network, upstream 5xx); try again after backoff.
    Retry,
    /// Permanent failure; surface immediately.
    Stop,
}

/// Retry configuration shared by outbound clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Backoff growth factor per attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that performs a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Same attempt budget without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Wait applied after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of all waits when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .sum()
    }

    /// Exponential schedule without jitter, so waits are exactly `base × multiplier^n`.
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: f64::from(self.multiplier.max(1)),
            max_interval: self.base_delay.max(MAX_INTERVAL),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Run `op` until it succeeds, `classify` says stop, or attempts run out.
    ///
    /// `op` receives the 0-based attempt number. The last error is returned on failure.
    pub async fn run<F, Fut, T, E>(
        &self,
        operation: &str,
        mut op: F,
        classify: impl Fn(&E) -> RetryDecision,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let classify = &classify;
        let mut next_attempt = 0u32;

        let attempt_once = move || {
            let attempt = next_attempt;
            next_attempt += 1;
            let call = op(attempt);
            async move {
                match call.await {
                    Ok(value) => {
                        if attempt > 0 {
                            info!(operation, attempt = attempt + 1, "call succeeded after retry");
                        }
                        Ok(value)
                    }
                    Err(err) if classify(&err) == RetryDecision::Stop => {
                        warn!(operation, error = %err, "permanent failure, not retrying");
                        Err(backoff::Error::Permanent(err))
                    }
                    Err(err) if attempt + 1 >= max_attempts => {
                        warn!(
                            operation,
                            attempts = attempt + 1,
                            error = %err,
                            "all retries exhausted"
                        );
                        Err(backoff::Error::Permanent(err))
                    }
                    Err(err) => Err(backoff::Error::transient(err)),
                }
            }
        };
        let on_retry = |err: E, delay: Duration| {
            warn!(
                operation,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying with backoff"
            );
        };

        backoff::future::retry_notify(self.schedule(), attempt_once, on_retry).await
    }
}
