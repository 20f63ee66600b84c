//! Per-tenant sliding-window rate limiter (§4.I: "60 requests/minute/tenant,
//! IPv6-safe key derivation"). Shape grounded on the teacher-adjacent
//! `openibank-auth::rate_limit::RateLimiter`: an in-memory
//! `HashMap<key, Vec<Instant>>` pruned to the current window on every
//! check. Keyed on `tenantCode` rather than a raw client IP, which sidesteps
//! the IPv6 key-derivation hazard entirely (no address parsing, no zone-id
//! ambiguity) instead of solving it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter over an arbitrary string key.
pub struct RateLimiter {
    limit: u32,
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// Build a limiter allowing `limit` requests per rolling 60s window.
    pub fn new(limit: u32) -> Self {
        Self { limit, buckets: Mutex::new(HashMap::new()) }
    }

    /// Record one request for `key`. `Ok(())` if under the limit, else
    /// `Err(retry_after)`.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_default();
        bucket.retain(|&t| now.duration_since(t) < WINDOW);

        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        if bucket.len() >= limit {
            let oldest = bucket[0];
            return Err(WINDOW.saturating_sub(now.duration_since(oldest)));
        }

        bucket.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            assert!(limiter.check("ACME").await.is_ok());
        }
        assert!(limiter.check("ACME").await.is_err());
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("ACME").await.is_ok());
        assert!(limiter.check("OTHER").await.is_ok());
        assert!(limiter.check("ACME").await.is_err());
    }
}
