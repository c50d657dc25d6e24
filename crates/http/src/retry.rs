//! Exponential backoff for transient outbound failures.
//!
//! Retry `n` (1-based) waits `base_delay * 2^(n-1)`, capped at `max_delay`,
//! optionally spread by ±20% jitter. A 429 carrying `Retry-After` waits for
//! exactly the server's hint instead.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use freshmate_config::ClientConfig;
use freshmate_core::ApiError;

const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; it is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: false,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.max_retries.saturating_add(1),
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
        )
        .with_jitter(config.jitter)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `retry` (1 = the wait after the first failure).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let raw = self.base_delay.saturating_mul(1u32 << exponent);
        let capped = raw.min(self.max_delay);

        if !self.jitter {
            return capped;
        }
        let factor = rand::rng().random_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
        capped.mul_f64(factor).min(self.max_delay)
    }

    /// The wait before the next attempt after `error`.
    pub fn delay_for(&self, retry: u32, error: &ApiError) -> Duration {
        error.retry_after().unwrap_or_else(|| self.backoff(retry))
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run
    /// out. The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::new(self.max_attempts);

        loop {
            state.attempt += 1;
            match operation(state.attempt).await {
                Ok(value) => {
                    if state.attempt > 1 {
                        debug!(attempt = state.attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && !state.exhausted() => {
                    let delay = self.delay_for(state.attempt, &err);
                    warn!(
                        attempt = state.attempt,
                        max_attempts = state.max_attempts,
                        kind = %err.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {err}"
                    );
                    state.last_error = Some(err);
                    sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(attempts = state.attempt, "Giving up: {err}");
                    } else {
                        debug!(kind = %err.kind(), "Terminal failure, not retrying: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Bookkeeping for one logical call.
#[derive(Debug)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<ApiError>,
}

impl RetryState {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
        }
    }

    fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
