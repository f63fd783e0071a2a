//! Rate limiting keyed by client, shared across tasks.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::counter::SubmissionLog;
use super::policy::{RateLimitDecision, RateLimitPolicy};
use crate::clock::Clock;

/// A concurrent map of client key to submission log.
///
/// The server uses this per IP address. Entries are created on the first
/// recorded submission and removed by [`cleanup`](Self::cleanup) once
/// they hold nothing inside the window.
pub struct KeyedRateLimiter {
    policy: RateLimitPolicy,
    entries: DashMap<String, SubmissionLog>,
    clock: Arc<dyn Clock>,
}

impl KeyedRateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
            clock,
        }
    }

    /// Check the limit for `key` without recording anything.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let decision = match self.entries.get(key) {
            Some(log) => self.policy.evaluate(&log, now),
            None => self.policy.evaluate(&SubmissionLog::new(), now),
        };

        if !decision.allowed {
            warn!(
                client = %key,
                reset_time = %decision.reset_time,
                "Client exceeded rate limit"
            );
        }

        decision
    }

    /// Record an accepted submission for `key`.
    pub fn record(&self, key: &str) {
        let now = self.clock.now();
        let mut log = self.entries.entry(key.to_string()).or_default();
        log.prune(now, self.policy.window.max(self.policy.min_interval));
        log.record(now);
    }

    /// Drop keys with no record left inside the window.
    ///
    /// Returns the number of keys removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let retain_for = self.policy.window.max(self.policy.min_interval);
        let before = self.entries.len();

        self.entries.retain(|_, log| {
            log.prune(now, retain_for);
            !log.is_empty()
        });

        let removed = before.saturating_sub(self.entries.len());
        debug!(removed, remaining = self.entries.len(), "Rate limit store cleanup");
        removed
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn limiter() -> (KeyedRateLimiter, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        let policy = RateLimitPolicy::window_only(5, Duration::minutes(10));
        (KeyedRateLimiter::new(policy, clock.clone()), clock)
    }

    #[test]
    fn test_check_does_not_create_entries() {
        let (limiter, _) = limiter();

        assert!(limiter.check("203.0.113.7").allowed);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_separate_keys_have_separate_logs() {
        let (limiter, _) = limiter();

        for _ in 0..5 {
            limiter.record("203.0.113.7");
        }
        limiter.record("198.51.100.1");

        assert!(!limiter.check("203.0.113.7").allowed);
        let other = limiter.check("198.51.100.1");
        assert!(other.allowed);
        assert_eq!(other.remaining, 4);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_reset_time_from_oldest_record() {
        let (limiter, clock) = limiter();
        let first = clock.now();

        for _ in 0..5 {
            limiter.record("203.0.113.7");
            clock.advance(Duration::seconds(10));
        }

        let decision = limiter.check("203.0.113.7");
        assert_eq!(decision.reset_time, first + Duration::minutes(10));
    }

    #[test]
    fn test_cleanup_drops_idle_keys() {
        let (limiter, clock) = limiter();

        limiter.record("203.0.113.7");
        clock.advance(Duration::minutes(8));
        limiter.record("198.51.100.1");
        clock.advance(Duration::minutes(3));

        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.check("198.51.100.1").remaining == 4);
    }
}
