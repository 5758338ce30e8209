//! Request rate limiting
//!
//! Token bucket sized from the configured requests-per-minute. Burst
//! capacity equals one minute's budget; tokens refill continuously, so
//! a drained bucket admits the next request after `60 / limit` seconds.

use std::sync::Mutex;
use std::time::Instant;

pub struct RateLimiter {
    /// Requests per minute; also the burst capacity. Zero disables limiting.
    limit_per_minute: u32,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            state: Mutex::new(Bucket {
                tokens: f64::from(limit_per_minute),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consume one token if available. Returns false when the caller
    /// should be rejected with a rate-limit error.
    pub fn try_acquire(&self) -> bool {
        if self.limit_per_minute == 0 {
            return true;
        }
        let mut bucket = match self.state.lock() {
            Ok(guard) => guard,
            // A poisoned lock only means another thread panicked mid-update;
            // the bucket state is still a plain pair of numbers.
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        let capacity = f64::from(self.limit_per_minute);
        let refill = elapsed.as_secs_f64() * capacity / 60.0;
        bucket.tokens = (bucket.tokens + refill).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
