//! Route handlers for the contact API.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info, instrument, warn};

use super::response::{ApiError, ContactResponse, TokenResponse};
use super::sessions::{session_cookie, session_id_from_cookie};
use super::AppState;
use crate::ratelimit::{limit_message, minutes_until};
use crate::sanitize::{sanitize_email, sanitize_with_limit};
use crate::transport::CSRF_HEADER;
use crate::validation::{self, ContactForm, ValidatedForm};

/// Best-effort client address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    /// Resolve from request parts: proxy headers (when trusted), then the
    /// peer address, then `"unknown"`.
    pub fn from_parts(parts: &Parts, trust_proxy: bool) -> Self {
        let proxied = trust_proxy
            .then(|| {
                header_str(&parts.headers, "x-forwarded-for")
                    .and_then(|v| v.split(',').next())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .or_else(|| {
                        header_str(&parts.headers, "x-real-ip")
                            .map(str::trim)
                            .filter(|v| !v.is_empty())
                    })
            })
            .flatten()
            .map(str::to_string);
        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        };

        ClientAddr(
            proxied
                .or_else(peer)
                .unwrap_or_else(|| "unknown".to_string()),
        )
    }
}

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config.server.trust_proxy_headers))
    }
}

pub async fn health() -> &'static str {
    "ok"
}

/// `GET /api/csrf-token`: issue (or return) the session's token.
pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let existing = header_str(&headers, COOKIE.as_str()).and_then(session_id_from_cookie);
    let (id, session) = state.sessions.get_or_create(existing);

    let token = {
        let mut session = session.lock();
        session.last_seen = state.clock.now();
        session.tokens.get_token()
    };

    let cookie = session_cookie(
        &id,
        state.sessions.idle_ttl(),
        state.config.server.secure_cookies,
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| {
        ApiError::Internal(format!("session cookie is not a header value: {}", e))
    })?;
    debug!(session = %id, "Issued token");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(TokenResponse {
            success: true,
            csrf_token: token,
        }),
    )
        .into_response())
}

/// `POST /api/contact`: enforce limits and token, validate, accept.
#[instrument(skip_all, fields(client = %client.0))]
pub async fn submit_contact(
    State(state): State<AppState>,
    client: ClientAddr,
    headers: HeaderMap,
    Json(form): Json<ContactForm>,
) -> Result<Response, ApiError> {
    let now = state.clock.now();

    let ip_decision = state.ip_limiter.check(&client.0);
    if !ip_decision.allowed {
        let policy = state.ip_limiter.policy();
        return Err(ApiError::RateLimited {
            message: limit_message(ip_decision.reset_time, now),
            retry_after_secs: ceil_secs(ip_decision.retry_after(now)),
            limit: policy.max_submissions,
            window_minutes: policy.window.num_minutes(),
        });
    }

    let token = header_str(&headers, CSRF_HEADER)
        .or(form.csrf_token.as_deref())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            warn!("Submission without token");
            ApiError::Forbidden("CSRF token missing")
        })?;

    let session = header_str(&headers, COOKIE.as_str())
        .and_then(session_id_from_cookie)
        .and_then(|id| state.sessions.get(id))
        .ok_or_else(|| {
            warn!("Submission without a known session");
            ApiError::Forbidden("Invalid CSRF token")
        })?;

    let mut session = session.lock();
    session.last_seen = now;

    if !session.tokens.validate_token(token) {
        warn!("Token mismatch or expired");
        return Err(ApiError::Forbidden("Invalid CSRF token"));
    }

    let spacing = session.limiter.check_limit();
    if !spacing.allowed {
        debug!(reset_time = %spacing.reset_time, "Session submitted too recently");
        return Err(ApiError::TooSoon {
            retry_after_secs: ceil_secs(spacing.retry_after(now)),
        });
    }

    let fields = validation::validate(&form).map_err(ApiError::Validation)?;
    let clean = clean_fields(fields)?;

    info!(
        name = %clean.name,
        email = %clean.email,
        subject = %clean.subject,
        chars = clean.message.chars().count(),
        "Accepted contact message"
    );

    state.ip_limiter.record(&client.0);
    session.limiter.record_submission();
    let next_token = session.tokens.rotate_token();
    drop(session);

    let after = state.ip_limiter.check(&client.0);
    let limit = state.ip_limiter.policy().max_submissions;
    let reset_epoch = after.reset_time.timestamp()
        + i64::from(after.reset_time.timestamp_subsec_millis() > 0);

    let mut response = Json(ContactResponse {
        success: true,
        message: "Message sent successfully!".to_string(),
        csrf_token: next_token,
    })
    .into_response();

    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(after.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_epoch));

    debug!(
        minutes_until_reset = minutes_until(after.reset_time, now),
        remaining = after.remaining,
        "Recorded submission"
    );

    Ok(response)
}

/// Escape and truncate each field to its storage limit.
fn clean_fields(fields: ValidatedForm) -> Result<ValidatedForm, ApiError> {
    let email = sanitize_email(&fields.email.to_lowercase())
        .ok_or_else(|| ApiError::Internal("validated email failed sanitizing".to_string()))?;

    Ok(ValidatedForm {
        name: sanitize_with_limit(&fields.name, 50),
        email: email.chars().take(100).collect(),
        subject: sanitize_with_limit(&fields.subject, 100),
        message: sanitize_with_limit(&fields.message, 1000),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn ceil_secs(d: chrono::Duration) -> i64 {
    let ms = d.num_milliseconds().max(0);
    (ms + 999) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request_parts(headers: &[(&str, &str)], peer: Option<SocketAddr>) -> Parts {
        let mut request = Request::builder();
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let (mut parts, _) = request.body(()).unwrap().into_parts();
        if let Some(peer) = peer {
            parts.extensions.insert(ConnectInfo(peer));
        }
        parts
    }

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([192, 0, 2, 10], 51234)))
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let parts = request_parts(&[("x-forwarded-for", " 203.0.113.7 , 10.0.0.1")], peer());
        assert_eq!(ClientAddr::from_parts(&parts, true).0, "203.0.113.7");
    }

    #[test]
    fn test_real_ip_when_no_forwarded_for() {
        let parts = request_parts(&[("x-real-ip", "198.51.100.4")], peer());
        assert_eq!(ClientAddr::from_parts(&parts, true).0, "198.51.100.4");

        let parts = request_parts(
            &[("x-forwarded-for", ""), ("x-real-ip", "198.51.100.4")],
            None,
        );
        assert_eq!(ClientAddr::from_parts(&parts, true).0, "198.51.100.4");
    }

    #[test]
    fn test_peer_address_fallback() {
        let parts = request_parts(&[], peer());
        assert_eq!(ClientAddr::from_parts(&parts, true).0, "192.0.2.10");

        let parts = request_parts(&[], None);
        assert_eq!(ClientAddr::from_parts(&parts, true).0, "unknown");
    }

    #[test]
    fn test_proxy_headers_ignored_unless_trusted() {
        let parts = request_parts(
            &[("x-forwarded-for", "203.0.113.7"), ("x-real-ip", "198.51.100.4")],
            peer(),
        );
        assert_eq!(ClientAddr::from_parts(&parts, false).0, "192.0.2.10");
    }

    #[test]
    fn test_clean_fields_escapes_and_lowercases() {
        let clean = clean_fields(ValidatedForm {
            name: "Grace Hopper".to_string(),
            email: "Grace@Example.COM".to_string(),
            subject: "Tom & Jerry".to_string(),
            message: format!("{}<b>", "m".repeat(997)),
        })
        .unwrap();

        assert_eq!(clean.email, "grace@example.com");
        assert_eq!(clean.subject, "Tom &amp; Jerry");
        assert!(clean.message.ends_with("mmm&lt;b&gt;"));
    }

    #[test]
    fn test_clean_fields_rejects_unsanitizable_email() {
        let result = clean_fields(ValidatedForm {
            name: "Grace Hopper".to_string(),
            email: "not-an-email".to_string(),
            subject: "Compilers".to_string(),
            message: "Let's talk about compilers.".to_string(),
        });

        assert!(matches!(result, Err(ApiError::Internal(_))));
    }
}
