//! Minimum-interval rate limiting for tracker requests.
//!
//! A caller that arrives before the interval has elapsed sleeps for the
//! remainder; the lock is held across the sleep so concurrent callers are
//! spaced out one interval apart.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum delay between consecutive requests.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be issued, then record it as issued now.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let wait = remaining_wait(prev.elapsed(), self.min_interval);
            if !wait.is_zero() {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limiting tracker request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Time still to wait when `elapsed` has passed since the previous request.
pub fn remaining_wait(elapsed: Duration, min_interval: Duration) -> Duration {
    min_interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_wait_subtracts_elapsed() {
        let min = Duration::from_millis(3100);
        assert_eq!(remaining_wait(Duration::from_millis(1000), min), Duration::from_millis(2100));
    }

    #[test]
    fn remaining_wait_is_zero_after_interval() {
        let min = Duration::from_millis(3100);
        assert_eq!(remaining_wait(Duration::from_secs(5), min), Duration::ZERO);
        assert_eq!(remaining_wait(min, min), Duration::ZERO);
    }

    #[tokio::test]
    async fn first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn consecutive_acquires_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(150));
        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
