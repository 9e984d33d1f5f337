//! Retry with exponential backoff around a whole retrieval chain run.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::types::config::PipelineConfig;

/// How many times to re-run a failed operation, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Wait before the first retry; doubles for each one after
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, base: Duration) -> Self {
        Self { retries, base }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.retry_count, config.retry_backoff_base)
    }

    /// No retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Wait before retry `retry` (1-based): `base * 2^(retry-1)`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or retries run out.
    ///
    /// Returns the last result and the number of attempts made.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> (Result<T, E>, u32)
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt <= self.retries => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        operation = %label,
                        attempt,
                        max_retries = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_from_config() {
        let config = PipelineConfig::new().with_retry(2, Duration::from_millis(250));
        assert_eq!(
            RetryPolicy::from_config(&config),
            RetryPolicy::new(2, Duration::from_millis(250))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let (result, attempts) = RetryPolicy::new(2, Duration::from_secs(1))
            .run("test", |_| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("failure {n}"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
        // 1s before the first retry, 2s before the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retries() {
        let (result, attempts): (Result<(), String>, u32) = RetryPolicy::new(1, Duration::from_secs(1))
            .run("test", |attempt| async move { Err(format!("failure {attempt}")) })
            .await;

        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_no_retries() {
        let (result, attempts): (Result<(), &str>, u32) =
            RetryPolicy::none().run("test", |_| async { Err("nope") }).await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
