//! Session-scoped token issuance and validation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::ratelimit::saturating_add;

/// Number of random bytes in a token (hex-encoded to twice as many chars).
pub const TOKEN_BYTES: usize = 32;

/// Default token lifetime.
pub fn default_token_ttl() -> Duration {
    Duration::hours(1)
}

/// A single anti-replay credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    fn generate(now: DateTime<Utc>, ttl: Duration) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        Self {
            value: hex::encode(bytes),
            issued_at: now,
            expires_at: saturating_add(now, ttl),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Holds at most one active token.
///
/// None of the operations fail: an invalid token is a `false` from
/// [`validate_token`](Self::validate_token), not an error.
pub struct TokenStore {
    current: Option<Token>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: None,
            ttl,
            clock,
        }
    }

    /// Return the current token, issuing a new one if absent or expired.
    pub fn get_token(&mut self) -> String {
        let now = self.clock.now();
        if let Some(token) = &self.current {
            if !token.is_expired_at(now) {
                return token.value.clone();
            }
        }
        self.issue(now)
    }

    /// True iff `candidate` matches the stored token and it has not expired.
    pub fn validate_token(&self, candidate: &str) -> bool {
        let Some(token) = &self.current else {
            trace!("No token issued for this session");
            return false;
        };

        if token.is_expired_at(self.clock.now()) {
            debug!(expires_at = %token.expires_at, "Token expired");
            return false;
        }

        constant_time_eq(candidate.as_bytes(), token.value.as_bytes())
    }

    /// Replace the stored token unconditionally.
    pub fn rotate_token(&mut self) -> String {
        let now = self.clock.now();
        self.issue(now)
    }

    pub fn current(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn issue(&mut self, now: DateTime<Utc>) -> String {
        let token = Token::generate(now, self.ttl);
        let value = token.value.clone();
        debug!(expires_at = %token.expires_at, "Issued new token");
        self.current = Some(token);
        value
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("issued_at", &self.current.as_ref().map(|t| t.issued_at))
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
