//! Client session state owned by the submission gate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::ratelimit::{RateLimitPolicy, RateLimiter};
use crate::token::TokenStore;

/// Everything that lives exactly as long as one browser session.
///
/// Dropping a `Session` discards its token and submission records.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    pub(crate) tokens: TokenStore,
    pub(crate) limiter: RateLimiter,
}

impl Session {
    pub fn new(policy: RateLimitPolicy, token_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: clock.now(),
            tokens: TokenStore::new(token_ttl, clock.clone()),
            limiter: RateLimiter::new(policy, clock),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}
