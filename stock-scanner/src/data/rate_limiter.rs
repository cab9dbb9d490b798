//! Token bucket throttle for outbound market data requests.
//!
//! Upstream quote services ban clients that burst, so every adapter request
//! takes a token first. The bucket holds one second's worth of requests and
//! refills continuously.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    /// Bucket size in whole requests
    capacity: u32,
    /// Tokens regained per second
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Limiter allowing `requests_per_minute` sustained, bursting up to one
    /// second's share (at least one request).
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let capacity = requests_per_minute.div_ceil(60).max(1);

        Self {
            name: name.into(),
            capacity,
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(f64::from(self.capacity));
        bucket.last_refill = now;
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket, Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Throttling request"
            );
            tokio::time::sleep(wait.max(Duration::from_millis(5))).await;
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut bucket) = self.bucket.try_lock() else {
            return false;
        };
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub type SharedRateLimiter = Arc<RateLimiter>;

pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_one_second_of_requests() {
        assert_eq!(RateLimiter::new("yahoo", 120).capacity(), 2);
        assert_eq!(RateLimiter::new("yahoo", 90).capacity(), 2);
        assert_eq!(RateLimiter::new("yahoo", 30).capacity(), 1);
        assert_eq!(RateLimiter::new("yahoo", 0).capacity(), 1);
    }

    #[test]
    fn test_try_acquire_exhausts_bucket() {
        let limiter = RateLimiter::new("test", 60);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new("test", 6000);
        while limiter.try_acquire() {}

        let started = Instant::now();
        tokio_test::block_on(limiter.acquire());
        // 100 tokens per second, so the wait is about 10ms
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shared_limiter_across_tasks() {
        let limiter = shared_limiter("shared", 6000);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(limiter.name(), "shared");
    }
}
