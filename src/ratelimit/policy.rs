//! Rate limit policy and decisions.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::counter::SubmissionLog;

/// Default number of submissions allowed per window.
pub const DEFAULT_MAX_SUBMISSIONS: u32 = 5;
/// Default window length in milliseconds (10 minutes).
pub const DEFAULT_WINDOW_MS: u64 = 600_000;
/// Default minimum spacing between accepted submissions (1 minute).
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 60_000;

/// Numeric limits applied to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum accepted submissions within the trailing window
    pub max_submissions: u32,
    /// Length of the trailing window
    pub window: Duration,
    /// Minimum time between two accepted submissions; zero disables spacing
    pub min_interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_submissions: DEFAULT_MAX_SUBMISSIONS,
            window: duration_ms(DEFAULT_WINDOW_MS),
            min_interval: duration_ms(DEFAULT_MIN_INTERVAL_MS),
        }
    }
}

impl RateLimitPolicy {
    pub fn new(max_submissions: u32, window: Duration, min_interval: Duration) -> Self {
        Self {
            max_submissions,
            window,
            min_interval,
        }
    }

    /// Window limiting only, as used per IP address.
    pub fn window_only(max_submissions: u32, window: Duration) -> Self {
        Self::new(max_submissions, window, Duration::zero())
    }

    /// Spacing only, as used per server-side session.
    pub fn spacing_only(min_interval: Duration) -> Self {
        Self::new(u32::MAX, min_interval, min_interval)
    }

    /// Evaluate a log against this policy without changing it.
    pub fn evaluate(&self, log: &SubmissionLog, now: DateTime<Utc>) -> RateLimitDecision {
        let count = u32::try_from(log.count_within(now, self.window)).unwrap_or(u32::MAX);
        let remaining = self.max_submissions.saturating_sub(count);
        let window_reset = log.oldest_within(now, self.window).map(|oldest| saturating_add(oldest, self.window));

        let mut reason = None;
        let mut reset_time = window_reset.unwrap_or(now);

        if count >= self.max_submissions {
            reason = Some(LimitReason::Window);
        }

        if self.min_interval > Duration::zero() {
            if let Some(newest) = log.newest() {
                let spacing_reset = saturating_add(newest, self.min_interval);
                if now < spacing_reset {
                    if reason.is_none() || spacing_reset > reset_time {
                        reset_time = spacing_reset;
                    }
                    reason = reason.or(Some(LimitReason::Spacing));
                }
            }
        }

        RateLimitDecision {
            allowed: reason.is_none(),
            remaining,
            reset_time,
            reason,
        }
    }
}

/// Which rule blocked a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitReason {
    /// The trailing window is at capacity
    Window,
    /// The previous accepted submission was too recent
    Spacing,
}

/// Per-client limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    Open,
    Limited,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub reason: Option<LimitReason>,
}

impl RateLimitDecision {
    pub fn state(&self) -> LimitState {
        if self.allowed {
            LimitState::Open
        } else {
            LimitState::Limited
        }
    }

    /// Time left until `reset_time`, never negative.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_time - now).max(Duration::zero())
    }
}

/// Human-readable retry text for a blocked submission.
pub fn limit_message(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = minutes_until(reset_time, now);
    format!(
        "Too many submissions. Please wait {} minute{} before trying again.",
        minutes,
        if minutes == 1 { "" } else { "s" }
    )
}

/// Whole minutes until `reset_time`, rounded up, at least one.
pub fn minutes_until(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (reset_time - now).num_milliseconds().max(0);
    ((ms + 59_999) / 60_000).max(1)
}

/// `at + d`, clamped to the latest representable instant.
pub fn saturating_add(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    at.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Build a `chrono::Duration` from configured milliseconds.
pub fn duration_ms(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 1_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.max_submissions, 5);
        assert_eq!(policy.window, Duration::minutes(10));
        assert_eq!(policy.min_interval, Duration::seconds(60));
    }

    #[test]
    fn test_empty_log_is_open() {
        let policy = RateLimitPolicy::default();
        let decision = policy.evaluate(&SubmissionLog::new(), t0());

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 5);
        assert_eq!(decision.reset_time, t0());
        assert_eq!(decision.state(), LimitState::Open);
    }

    #[test]
    fn test_spacing_blocks_recent_submission() {
        let policy = RateLimitPolicy::default();
        let mut log = SubmissionLog::new();
        log.record(t0());

        let decision = policy.evaluate(&log, t0() + Duration::seconds(30));

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(LimitReason::Spacing));
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_time, t0() + Duration::seconds(60));
    }

    #[test]
    fn test_window_reset_wins_over_spacing() {
        let policy = RateLimitPolicy::default();
        let mut log = SubmissionLog::new();
        for minute in 0..5 {
            log.record(t0() + Duration::minutes(minute));
        }

        let decision = policy.evaluate(&log, t0() + Duration::seconds(250));

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(LimitReason::Window));
        assert_eq!(decision.reset_time, t0() + Duration::minutes(10));
    }

    #[test]
    fn test_window_only_ignores_spacing() {
        let policy = RateLimitPolicy::window_only(2, Duration::minutes(10));
        let mut log = SubmissionLog::new();
        log.record(t0());

        let decision = policy.evaluate(&log, t0() + Duration::seconds(1));

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_spacing_only_policy() {
        let policy = RateLimitPolicy::spacing_only(Duration::seconds(60));
        let mut log = SubmissionLog::new();
        log.record(t0());

        assert!(!policy.evaluate(&log, t0() + Duration::seconds(59)).allowed);
        assert!(policy.evaluate(&log, t0() + Duration::seconds(60)).allowed);
    }

    #[test]
    fn test_limit_message() {
        let now = t0();
        assert_eq!(
            limit_message(now + Duration::seconds(30), now),
            "Too many submissions. Please wait 1 minute before trying again."
        );
        assert_eq!(
            limit_message(now + Duration::seconds(301), now),
            "Too many submissions. Please wait 6 minutes before trying again."
        );
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let policy = RateLimitPolicy::new(1, duration_ms(u64::MAX), duration_ms(u64::MAX));
        let mut log = SubmissionLog::new();
        log.record(t0());

        let decision = policy.evaluate(&log, t0() + Duration::seconds(1));

        assert!(!decision.allowed);
        assert_eq!(decision.reset_time, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_retry_after_never_negative() {
        let decision = RateLimitDecision {
            allowed: true,
            remaining: 5,
            reset_time: t0(),
            reason: None,
        };
        assert_eq!(decision.retry_after(t0() + Duration::minutes(1)), Duration::zero());
    }
}
