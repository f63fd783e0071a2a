//! Server-side sessions keyed by cookie.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::ratelimit::{RateLimitPolicy, RateLimiter};
use crate::token::TokenStore;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "contact_session";

/// State held for one visitor between requests.
#[derive(Debug)]
pub struct ServerSession {
    pub tokens: TokenStore,
    /// Enforces spacing between this session's submissions
    pub limiter: RateLimiter,
    pub last_seen: DateTime<Utc>,
}

pub type SharedSession = Arc<Mutex<ServerSession>>;

/// All live sessions.
pub struct SessionRegistry {
    sessions: DashMap<String, SharedSession>,
    token_ttl: Duration,
    policy: RateLimitPolicy,
    idle_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(
        token_ttl: Duration,
        policy: RateLimitPolicy,
        idle_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            token_ttl,
            policy,
            idle_ttl,
            clock,
        }
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    /// Look up `id`, or start a new session if it is absent or unknown.
    pub fn get_or_create(&self, id: Option<&str>) -> (String, SharedSession) {
        if let Some(id) = id {
            if let Some(session) = self.get(id) {
                return (id.to_string(), session);
            }
        }

        let id = Uuid::new_v4().simple().to_string();
        let session = Arc::new(Mutex::new(ServerSession {
            tokens: TokenStore::new(self.token_ttl, self.clock.clone()),
            limiter: RateLimiter::new(self.policy, self.clock.clone()),
            last_seen: self.clock.now(),
        }));
        self.sessions.insert(id.clone(), Arc::clone(&session));
        debug!(session = %id, "Created session");
        (id, session)
    }

    /// Drop sessions idle for longer than the session TTL.
    pub fn cleanup(&self) -> usize {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(self.idle_ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.lock().last_seen > cutoff);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }
}

/// Extract the session id from a `Cookie` header value.
pub fn session_id_from_cookie(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a session.
pub fn session_cookie(id: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE,
        id,
        max_age.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
