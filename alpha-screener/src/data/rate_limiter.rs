//! Token bucket rate limiter for upstream request throttling.
//!
//! The request budget bounds how many calls a run may make; this limiter
//! bounds how fast they are made, so a burst from the backfill worker pool
//! does not trip the provider's 429 responses.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket rate limiter.
///
/// Holds at most one second worth of tokens and refills continuously at
/// `requests_per_minute / 60` tokens per second.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `name` - Name for logging purposes
    /// * `requests_per_minute` - Maximum requests allowed per minute
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1) as f64;
        let capacity = (rpm / 60.0).ceil().max(1.0);

        Self {
            name: name.into(),
            capacity,
            refill_per_sec: rpm / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquire a token, waiting until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.take_or_wait() {
                None => return,
                Some(wait) => wait,
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for token"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_none()
    }

    /// Take a token, or report how long until the next one is due.
    fn take_or_wait(&self) -> Option<Duration> {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }

        let missing = 1.0 - bucket.tokens;
        let wait = Duration::from_secs_f64(missing / self.refill_per_sec);
        Some(wait.clamp(Duration::from_millis(10), Duration::from_secs(1)))
    }

    /// Get the configured capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_one_second_of_requests() {
        assert_eq!(RateLimiter::new("test", 300).capacity(), 5);
        assert_eq!(RateLimiter::new("test", 30).capacity(), 1);
    }

    #[test]
    fn test_try_acquire_drains_bucket() {
        let limiter = RateLimiter::new("test", 60);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = shared_limiter("test", 6000);
        while limiter.try_acquire() {}

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
