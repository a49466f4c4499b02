//! Per-caller sliding-window request limiter.
//!
//! Each identity (the caller's network address) gets an ordered window of
//! admission timestamps. Timestamps older than the window are evicted
//! lazily on each check. The check-then-record sequence for one identity
//! runs under the map's entry lock, so two concurrent checks can never both
//! take the last slot.
//!
//! In-memory and per-process: the state resets on restart and is not
//! shared between instances.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RateLimitConfig;

/// Sliding-window rate limiter keyed by caller identity.
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            max_requests = config.max_requests,
            window_secs = config.window.as_secs(),
            "Request rate limiter configured"
        );
        Self {
            windows: DashMap::new(),
            max_requests: config.max_requests,
            window: config.window,
        }
    }

    /// Check whether a request from `identity` should be admitted now.
    ///
    /// Returns `true` if admitted. Only admitted requests occupy a slot.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    pub(crate) fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut hits = self.windows.entry(identity.to_string()).or_default();
        prune(&mut hits, now, self.window);

        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Remove identities whose windows have fully expired.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self) -> usize {
        self.cleanup_stale_at(Instant::now())
    }

    pub(crate) fn cleanup_stale_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, hits| {
            prune(hits, now, self.window);
            !hits.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(
                removed,
                remaining = self.windows.len(),
                "Cleaned up stale rate limiter entries"
            );
        }
        removed
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Spawn a background task that periodically drops expired windows.
    ///
    /// Runs every window length and stops when `shutdown` is cancelled.
    pub fn spawn_cleanup_task(self: &Arc<Self>, shutdown: CancellationToken) {
        let limiter = Arc::clone(self);
        let interval = limiter.window.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        limiter.cleanup_stale();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Rate limiter cleanup task shutting down");
                        break;
                    }
                }
            }
        });
    }
}

/// Drop timestamps that fell out of the trailing window ending at `now`.
fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = hits.front() {
        if now.saturating_duration_since(oldest) > window {
            hits.pop_front();
        } else {
            break;
        }
    }
}
