//! Per-session rate limiter.

use std::sync::Arc;

use tracing::{debug, trace};

use super::counter::SubmissionLog;
use super::policy::{limit_message, RateLimitDecision, RateLimitPolicy};
use crate::clock::Clock;

/// Bounds accepted submissions for a single client session.
///
/// Both the trailing window and the minimum spacing of the policy must
/// pass for a submission to be allowed. Records are only added through
/// [`record_submission`](Self::record_submission), which callers invoke
/// once a submission has actually been accepted.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    log: SubmissionLog,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            log: SubmissionLog::new(),
            clock,
        }
    }

    /// Decide whether a submission would be allowed now. Does not mutate.
    pub fn check_limit(&self) -> RateLimitDecision {
        let decision = self.policy.evaluate(&self.log, self.clock.now());

        trace!(
            allowed = decision.allowed,
            remaining = decision.remaining,
            reset_time = %decision.reset_time,
            "Checked rate limit"
        );

        decision
    }

    /// Record an accepted submission at the current time.
    pub fn record_submission(&mut self) {
        let now = self.clock.now();
        self.log.prune(now, self.window_for_pruning());
        self.log.record(now);

        debug!(
            in_window = self.log.len(),
            max = self.policy.max_submissions,
            "Recorded submission"
        );
    }

    /// Retry text for a blocked decision.
    pub fn limit_message(&self, decision: &RateLimitDecision) -> String {
        limit_message(decision.reset_time, self.clock.now())
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Number of records currently retained.
    pub fn record_count(&self) -> usize {
        self.log.len()
    }

    // Spacing needs the newest record even when it is older than the window.
    fn window_for_pruning(&self) -> chrono::Duration {
        self.policy.window.max(self.policy.min_interval)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("records", &self.log.len())
            .finish()
    }
}
