//! Sliding-window rate limiting.

mod counter;
mod keyed;
mod limiter;
mod policy;

pub use counter::SubmissionLog;
pub use keyed::KeyedRateLimiter;
pub use limiter::RateLimiter;
pub use policy::{
    duration_ms, limit_message, minutes_until, saturating_add, LimitReason, LimitState,
    RateLimitDecision, RateLimitPolicy, DEFAULT_MAX_SUBMISSIONS, DEFAULT_MIN_INTERVAL_MS,
    DEFAULT_WINDOW_MS,
};
