//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pygmalion_core::{Catalog, ConditionAssigner};
use pygmalion_storage::ResponseSink;
use tokio::sync::Mutex;

use super::registry::FlowRegistry;
use super::RATE_LIMIT_WINDOW_SECS;

/// Per-IP request tracker: (request count, window start time).
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

/// Tracker size at which expired windows are swept out.
const PRUNE_THRESHOLD: usize = 1024;

/// In-memory per-IP rate limiter.
pub(crate) struct RateLimiter {
    /// Request counts per IP per window.
    tracker: Mutex<IpTracker>,
    /// Maximum requests per window.
    pub(crate) max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self::with_window(max_requests, Duration::from_secs(RATE_LIMIT_WINDOW_SECS))
    }

    pub(crate) fn with_window(max_requests: u64, window: Duration) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Check if a request from the given IP is allowed.
    /// Returns Ok(()) if allowed, Err(retry_after_secs) if rate limited.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut tracker = self.tracker.lock().await;
        let now = Instant::now();

        if tracker.len() >= PRUNE_THRESHOLD {
            let before = tracker.len();
            tracker.retain(|_, (_, start)| now.duration_since(*start) < self.window);
            tracing::debug!(
                evicted = before - tracker.len(),
                remaining = tracker.len(),
                "pruned expired rate limit windows"
            );
        }

        let entry = tracker.entry(ip).or_insert((0, now));

        let elapsed = now.duration_since(entry.1);
        if elapsed >= self.window {
            entry.0 = 0;
            entry.1 = now;
        }

        entry.0 += 1;
        if entry.0 > self.max_requests {
            Err(self.window.saturating_sub(elapsed).as_secs())
        } else {
            Ok(())
        }
    }
}

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) catalog: Catalog,
    pub(crate) sink: Arc<dyn ResponseSink>,
    pub(crate) assigner: Arc<dyn ConditionAssigner>,
    pub(crate) flows: FlowRegistry,
    pub(crate) rate_limiter: RateLimiter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn limiter_blocks_after_budget() {
        let limiter = RateLimiter::new(2);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_ok());
        let retry_after = limiter.check(ip).await.unwrap_err();
        assert!(retry_after <= RATE_LIMIT_WINDOW_SECS);
    }

    #[tokio::test]
    async fn expired_windows_are_pruned() {
        let limiter = RateLimiter::with_window(10, Duration::ZERO);
        for i in 0..3000u32 {
            let ip = IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i));
            assert!(limiter.check(ip).await.is_ok());
        }
        assert!(limiter.tracker.lock().await.len() <= PRUNE_THRESHOLD);
    }

    #[tokio::test]
    async fn live_windows_survive_pruning() {
        let limiter = RateLimiter::new(1);
        let first = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1));
        assert!(limiter.check(first).await.is_ok());
        for i in 0..(PRUNE_THRESHOLD as u32 + 10) {
            let _ = limiter.check(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i))).await;
        }
        assert!(limiter.check(first).await.is_err());
    }

    #[tokio::test]
    async fn limiter_tracks_ips_separately() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))).await.is_ok());
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))).await.is_ok());
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))).await.is_err());
    }
}
