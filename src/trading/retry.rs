//! Retry with exponential backoff for broker order placement.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::warn;

/// Waits between attempts. Injected so tests can skip wall-clock delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry: `max_attempts` tries, waiting `base_delay * 2^n` between them.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            sleeper,
        }
    }

    /// Uncapped doubling schedule with no jitter.
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(u32::MAX as u64))
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `operation` until it succeeds or attempts run out; the last error is returned.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut schedule = self.schedule();
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        operation = label,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = schedule.next_backoff().unwrap_or(self.base_delay);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
