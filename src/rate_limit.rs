use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::identity::hash_address;

/// Sliding-window request limiter keyed by (tagged) client address.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: HashMap::new(),
        }
    }

    /// Record a request from `key`. Returns false once the key has used up
    /// its allowance for the current window; rejected requests are not
    /// counted.
    pub fn check(&mut self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> bool {
        self.clear_stale(now);

        let hits = self.hits.entry(key.to_string()).or_default();
        if hits.len() >= self.max_requests {
            tracing::warn!(sender = %hash_address(key), "Rate limit exceeded");
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Drop timestamps older than the window and forget idle keys
    fn clear_stale(&mut self, now: Instant) {
        let window = self.window;
        self.hits.retain(|_, hits| {
            while let Some(oldest) = hits.front() {
                if now.duration_since(*oldest) >= window {
                    hits.pop_front();
                } else {
                    break;
                }
            }
            !hits.is_empty()
        });
    }
}
