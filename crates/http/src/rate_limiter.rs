//! Token bucket rate limiter shared by every call through one client.
//!
//! Tokens refill continuously: `tokens = min(tokens + elapsed * rate, capacity)`.
//! An acquisition succeeds once at least one whole token is available.
//! Refill and decrement happen under the same lock, so the balance never
//! goes negative however many tasks contend for it.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use freshmate_core::Error;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimiter {
    /// Create a limiter that admits `refill_rate` requests per second with
    /// bursts of up to `capacity`. The bucket starts full.
    pub fn new(refill_rate: f64, capacity: f64) -> Result<Self, Error> {
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(Error::config(format!(
                "rate limit must be a positive number, got {refill_rate}"
            )));
        }
        if !capacity.is_finite() || capacity < 1.0 {
            return Err(Error::config(format!(
                "burst capacity must be at least 1, got {capacity}"
            )));
        }

        Ok(Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        })
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(Instant::now(), self.refill_rate, self.capacity);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }

                let needed = 1.0 - bucket.tokens;
                Duration::from_secs_f64(needed / self.refill_rate)
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            sleep(wait).await;
        }
    }

    /// Consume a token only if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.refill_rate, self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current balance, after refill.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.refill_rate, self.capacity);
        bucket.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn invalid_settings_rejected() {
        assert!(RateLimiter::new(0.0, 10.0).is_err());
        assert!(RateLimiter::new(-1.0, 10.0).is_err());
        assert!(RateLimiter::new(f64::NAN, 10.0).is_err());
        assert!(RateLimiter::new(5.0, 0.5).is_err());
        assert!(RateLimiter::new(5.0, 1_000_000.0).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate() {
        let limiter = RateLimiter::new(5.0, 5.0).unwrap();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(limiter.available().await < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_waits_one_interval() {
        let limiter = RateLimiter::new(2.0, 2.0).unwrap();
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_capacity() {
        let limiter = RateLimiter::new(10.0, 3.0).unwrap();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(limiter.available().await, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_does_not_wait() {
        let limiter = RateLimiter::new(1.0, 1.0).unwrap();
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
        sleep(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn admissions_bounded_by_capacity_plus_rate() {
        let rate = 10.0;
        let capacity = 5.0;
        let limiter = Arc::new(RateLimiter::new(rate, capacity).unwrap());
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut admitted_at = Vec::new();
        for handle in handles {
            admitted_at.push(handle.await.unwrap());
        }

        // Over any prefix window [start, t], admissions <= capacity + rate * t.
        admitted_at.sort();
        for (i, at) in admitted_at.iter().enumerate() {
            let t = at.duration_since(start).as_secs_f64();
            let bound = capacity + rate * t;
            assert!(
                (i + 1) as f64 <= bound + 1e-6,
                "admission {} at {t}s exceeds bound {bound}",
                i + 1
            );
        }
        assert!(limiter.available().await >= 0.0);
    }
}
