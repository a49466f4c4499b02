//! Per-user concurrent session accounting.
//!
//! Counts active proxy sessions per user identifier to detect or block
//! credential sharing. In log-only mode over-limit sessions are admitted
//! and reported, so operators can watch sharing patterns before enforcing
//! a cap on legitimate multi-device users.
//!
//! This is a standalone gate: nothing in the add/remove path calls it.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::warn;

use crate::config::SessionLimitConfig;

/// Concurrent session counter keyed by user identifier.
///
/// Counts are always positive: an entry is removed when its count reaches
/// zero.
pub struct SessionLimiter {
    active: DashMap<String, usize>,
    max_sessions: usize,
    log_only: bool,
    exceeded: AtomicU64,
}

impl SessionLimiter {
    pub fn new(config: SessionLimitConfig) -> Self {
        Self {
            active: DashMap::new(),
            max_sessions: config.max_sessions,
            log_only: config.log_only,
            exceeded: AtomicU64::new(0),
        }
    }

    /// Accounting is disabled when the configured maximum is 0.
    pub fn enabled(&self) -> bool {
        self.max_sessions > 0
    }

    pub fn log_only(&self) -> bool {
        self.log_only
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Register a new session for `identifier`.
    ///
    /// Returns `false` only when the limit is enforced and already reached.
    /// An over-limit session in log-only mode is admitted without being
    /// counted.
    pub fn start_session(&self, identifier: &str) -> bool {
        if !self.enabled() {
            return true;
        }

        match self.active.entry(identifier.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current >= self.max_sessions {
                    self.exceeded.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        uuid = %identifier,
                        active = current,
                        limit = self.max_sessions,
                        log_only = self.log_only,
                        "connection_limit_exceeded"
                    );
                    return self.log_only;
                }
                *entry.get_mut() = current + 1;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
                true
            }
        }
    }

    /// Mark a session for `identifier` as finished.
    pub fn end_session(&self, identifier: &str) {
        if !self.enabled() {
            return;
        }

        if let Entry::Occupied(mut entry) = self.active.entry(identifier.to_string()) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    /// Report suspicious activity without touching any counter.
    pub fn mark_suspicious(&self, identifier: &str) {
        warn!(uuid = %identifier, "suspicious_activity");
    }

    /// Active sessions for `identifier` (0 when untracked).
    pub fn active_sessions(&self, identifier: &str) -> usize {
        self.active.get(identifier).map(|count| *count).unwrap_or(0)
    }

    /// Number of identifiers with at least one active session.
    pub fn tracked_identifiers(&self) -> usize {
        self.active.len()
    }

    /// Limit-exceeded events observed since startup.
    pub fn exceeded_total(&self) -> u64 {
        self.exceeded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(max_sessions: usize, log_only: bool) -> SessionLimiter {
        SessionLimiter::new(SessionLimitConfig {
            max_sessions,
            log_only,
        })
    }

    #[test]
    fn test_hard_mode_blocks_second_session() {
        let limiter = limiter(1, false);
        assert!(limiter.start_session("A"));
        assert!(!limiter.start_session("A"));
        assert_eq!(limiter.exceeded_total(), 1);

        limiter.end_session("A");
        assert!(limiter.start_session("A"));
    }

    #[test]
    fn test_log_only_mode_admits_over_limit() {
        let limiter = limiter(1, true);
        assert!(limiter.start_session("A"));
        assert!(limiter.start_session("A"));
        assert_eq!(limiter.exceeded_total(), 1);
        // The over-limit session is not counted.
        assert_eq!(limiter.active_sessions("A"), 1);
    }

    #[test]
    fn test_reports_configuration() {
        let limiter = limiter(3, true);
        assert!(limiter.enabled());
        assert_eq!(limiter.max_sessions(), 3);
        assert!(limiter.log_only());
    }

    #[test]
    fn test_disabled_always_admits() {
        let limiter = limiter(0, false);
        assert!(!limiter.enabled());
        for _ in 0..10 {
            assert!(limiter.start_session("A"));
        }
        assert_eq!(limiter.active_sessions("A"), 0);
        limiter.end_session("A");
        assert_eq!(limiter.tracked_identifiers(), 0);
    }

    #[test]
    fn test_entry_removed_at_zero() {
        let limiter = limiter(3, false);
        limiter.start_session("A");
        limiter.start_session("A");
        assert_eq!(limiter.active_sessions("A"), 2);

        limiter.end_session("A");
        limiter.end_session("A");
        assert_eq!(limiter.tracked_identifiers(), 0);

        // Ending an untracked session never goes negative.
        limiter.end_session("A");
        assert_eq!(limiter.active_sessions("A"), 0);
        assert_eq!(limiter.tracked_identifiers(), 0);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = limiter(1, false);
        assert!(limiter.start_session("A"));
        assert!(limiter.start_session("B"));
        assert!(!limiter.start_session("A"));
    }

    #[test]
    fn test_mark_suspicious_leaves_counters() {
        let limiter = limiter(2, false);
        limiter.start_session("A");
        limiter.mark_suspicious("A");
        assert_eq!(limiter.active_sessions("A"), 1);
        assert_eq!(limiter.exceeded_total(), 0);
    }

    #[test]
    fn test_concurrent_starts_admit_exactly_the_limit() {
        let limiter = Arc::new(limiter(4, false));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.start_session("shared"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(admitted, 4);
        assert_eq!(limiter.active_sessions("shared"), 4);
        assert_eq!(limiter.exceeded_total(), 12);
    }
}
