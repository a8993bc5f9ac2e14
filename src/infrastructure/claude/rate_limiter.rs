//! Client-side request pacing for the LLM provider.
//!
//! Every agent process in a session shares one provider quota, so each
//! client paces itself rather than waiting to be 429'd.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Token bucket: capacity equals the sustained rate, so an idle client may
/// burst one second's worth of requests and then settles at the configured
/// requests per second.
pub struct TokenBucketRateLimiter {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketRateLimiter {
    /// Create a limiter sustaining `requests_per_second`.
    pub fn new(requests_per_second: f64) -> Self {
        assert!(
            requests_per_second > 0.0,
            "requests_per_second must be positive"
        );
        Self {
            state: Mutex::new(BucketState {
                tokens: requests_per_second,
                last_refill: Instant::now(),
            }),
            capacity: requests_per_second,
            refill_rate: requests_per_second,
        }
    }

    /// Acquire a token, waiting if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                let refilled = (state.tokens + elapsed * self.refill_rate).min(self.capacity);

                if refilled >= 1.0 {
                    state.tokens = refilled - 1.0;
                    state.last_refill = now;
                    return;
                }

                Duration::from_secs_f64((1.0 - refilled) / self.refill_rate)
            };
            sleep(wait).await;
        }
    }

    /// Current number of available tokens (for tests and monitoring).
    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = Instant::now().duration_since(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_full_bucket_does_not_block() {
        let limiter = TokenBucketRateLimiter::new(3.0);

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_empty_bucket_waits_one_refill() {
        let limiter = TokenBucketRateLimiter::new(4.0);
        for _ in 0..4 {
            limiter.acquire().await;
        }

        // The fifth acquire needs one token at 4/s, so roughly 250ms.
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_tokens_accumulate_while_idle() {
        let limiter = TokenBucketRateLimiter::new(4.0);
        for _ in 0..4 {
            limiter.acquire().await;
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
        let available = limiter.available_tokens().await;
        assert!((available - 1.0).abs() < 0.3, "roughly one token after 250ms");
    }

    #[tokio::test]
    async fn test_contended_acquires_respect_rate() {
        let limiter = Arc::new(TokenBucketRateLimiter::new(4.0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        // 4 burst through, the remaining 4 drain at 4/s: ~1s overall.
        let start = Instant::now();
        for handle in handles {
            handle.await.unwrap();
        }
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(800));
        assert!(elapsed < Duration::from_millis(1600));
    }
}
