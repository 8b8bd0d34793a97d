// Client-side request pacing for vendor APIs with per-second quotas.
//
// Perspective's free tier allows 1 QPS. Going over that gets the key
// throttled for everyone sharing it, so each provider paces its own calls:
// requests are spaced at least `interval` apart, and a caller that arrives
// early sleeps for the remainder.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Slowest pacing we honor; anything slower is a misconfigured rate.
const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Spaces outbound requests to stay under a fixed rate.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Pacing>>,
}

struct Pacing {
    /// Minimum spacing between requests; zero disables pacing
    interval: Duration,
    /// The earliest instant the next request may go out
    next_slot: Option<Instant>,
}

impl RateLimiter {
    /// A limiter allowing `requests_per_second` requests per second.
    /// Non-positive rates disable pacing.
    pub fn per_second(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .map_or(MAX_INTERVAL, |d| d.min(MAX_INTERVAL))
        } else {
            Duration::ZERO
        };
        Self {
            inner: Arc::new(Mutex::new(Pacing {
                interval,
                next_slot: None,
            })),
        }
    }

    /// Wait for this caller's slot.
    ///
    /// The slot is reserved while holding the lock, and the sleep happens
    /// after releasing it, so concurrent callers queue up behind each other
    /// instead of all waking at the same instant.
    pub async fn acquire(&self) {
        let wait_until = {
            let mut pacing = self.inner.lock().await;
            if pacing.interval.is_zero() {
                return;
            }
            let now = Instant::now();
            let slot = match pacing.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            pacing.next_slot = Some(slot + pacing.interval);
            slot
        };

        tokio::time::sleep_until(wait_until).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_request_is_immediate() {
        let limiter = RateLimiter::per_second(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_waits_one_interval() {
        let limiter = RateLimiter::per_second(2.0); // 500ms spacing
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(500),
            "Expected ~500ms delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_rate_never_waits() {
        let limiter = RateLimiter::per_second(0.0);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
