use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::{DETAIL_BACKOFF_BASE_MS, DETAIL_BACKOFF_CAP_MS, DETAIL_MAX_ATTEMPTS};
use crate::error::{AppError, Result};

/// Randomized exponential backoff around a fallible async operation.
///
/// Attempt `n` (1-based) waits up to `base * 2^(n-1)`, capped at `cap`. With
/// jitter enabled the wait is drawn uniformly from `[base, that bound]`.
/// Errors rejected by `retryable` are returned without further attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_ms: u64,
    cap_ms: u64,
    jitter: bool,
    retryable: fn(&AppError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64, cap_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_ms,
            cap_ms: cap_ms.max(base_ms),
            jitter: true,
            retryable: AppError::is_transient,
        }
    }

    #[cfg(test)]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    #[cfg(test)]
    pub fn with_retryable(mut self, retryable: fn(&AppError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self, err: &AppError) -> bool {
        (self.retryable)(err)
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let power = attempt.saturating_sub(1).min(16);
        let upper = self.base_ms.saturating_mul(1u64 << power).min(self.cap_ms);

        let ms = if self.jitter && upper > self.base_ms {
            rand::thread_rng().gen_range(self.base_ms..=upper)
        } else {
            upper
        };
        Duration::from_millis(ms)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.is_retryable(&e) => {
                    let wait = self.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "{label} failed: {e}; retrying in {:.1}s",
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DETAIL_MAX_ATTEMPTS, DETAIL_BACKOFF_BASE_MS, DETAIL_BACKOFF_CAP_MS)
    }
}
