//! HTTP backend for the contact form.
//!
//! Enforces the same limits as the client gate on the server side: a
//! sliding window per client address and minimum spacing per session,
//! with tokens bound to a cookie session.

mod handlers;
mod response;
mod sessions;

pub use handlers::ClientAddr;
pub use response::ApiError;
pub use sessions::{
    session_cookie, session_id_from_cookie, ServerSession, SessionRegistry, SESSION_COOKIE,
};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::clock::{self, Clock};
use crate::config::ContactGateConfig;
use crate::error::{ContactGateError, Result};
use crate::ratelimit::KeyedRateLimiter;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ContactGateConfig>,
    pub ip_limiter: Arc<KeyedRateLimiter>,
    pub sessions: Arc<SessionRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: ContactGateConfig, clock: Arc<dyn Clock>) -> Self {
        let ip_limiter = KeyedRateLimiter::new(config.rate_limiting.ip_policy(), clock.clone());
        let sessions = SessionRegistry::new(
            config.token.ttl(),
            config.rate_limiting.session_policy(),
            config.server.session_ttl(),
            clock.clone(),
        );
        Self {
            config: Arc::new(config),
            ip_limiter: Arc::new(ip_limiter),
            sessions: Arc::new(sessions),
            clock,
        }
    }

    /// Prune the per-client map and idle sessions once.
    pub fn cleanup(&self) {
        let clients = self.ip_limiter.cleanup();
        let sessions = self.sessions.cleanup();
        info!(
            removed_clients = clients,
            removed_sessions = sessions,
            tracked_clients = self.ip_limiter.len(),
            live_sessions = self.sessions.len(),
            "Cleanup finished"
        );
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/csrf-token", get(handlers::issue_token))
        .route("/api/contact", post(handlers::submit_contact))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for the contact API.
pub struct ContactServer {
    addr: SocketAddr,
    state: AppState,
}

impl ContactServer {
    pub fn new(config: ContactGateConfig) -> Self {
        Self::with_clock(config, clock::system())
    }

    pub fn with_clock(config: ContactGateConfig, clock: Arc<dyn Clock>) -> Self {
        let addr = config.server.bind_addr;
        Self {
            addr,
            state: AppState::new(config, clock),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        let local = listener.local_addr()?;
        let cleanup = spawn_cleanup(self.state.clone());

        info!(addr = %local, "Starting contact API server");

        let result = axum::serve(
            listener,
            router(self.state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            ContactGateError::Http(e.to_string())
        });

        cleanup.abort();
        result
    }
}

fn spawn_cleanup(state: AppState) -> JoinHandle<()> {
    let period = state.config.server.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            state.cleanup();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use chrono::Duration;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const CLIENT: &str = "203.0.113.7";

    fn app() -> (Router, AppState, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        let mut config = ContactGateConfig::default();
        config.server.trust_proxy_headers = true;
        let state = AppState::new(config, clock.clone());
        (router(state.clone()), state, clock)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Fetch a token and return `(cookie header, token)`.
    async fn fetch_token(app: &Router) -> (String, String) {
        let response = app
            .clone()
            .oneshot(Request::get("/api/csrf-token").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let body = body_json(response).await;
        (cookie, body["csrf_token"].as_str().unwrap().to_string())
    }

    fn contact_body(token: Option<&str>) -> Value {
        let mut body = json!({
            "name": "Grace Hopper",
            "email": "Grace@Example.com",
            "subject": "Compilers",
            "message": "Let's talk about <b>compilers</b>.",
        });
        if let Some(token) = token {
            body["csrf_token"] = json!(token);
        }
        body
    }

    async fn post_contact(app: &Router, cookie: Option<&str>, body: Value) -> Response {
        let mut request = Request::post("/api/contact")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", format!("{}, 10.0.0.1", CLIENT));
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        app.clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_endpoint_sets_session_cookie() {
        let (app, state, _) = app();

        let (cookie, token) = fetch_token(&app).await;

        assert!(cookie.starts_with("contact_session="));
        assert_eq!(token.len(), 64);
        assert_eq!(state.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_token_is_stable_within_session() {
        let (app, _, _) = app();
        let (cookie, token) = fetch_token(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/csrf-token")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["csrf_token"], token.as_str());
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let (app, state, _) = app();
        let (cookie, token) = fetch_token(&app).await;

        let response = post_contact(&app, Some(&cookie), contact_body(Some(&token))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Message sent successfully!");
        assert_ne!(body["csrf_token"], token.as_str());
        assert_eq!(state.ip_limiter.check(CLIENT).remaining, 4);
    }

    #[tokio::test]
    async fn test_missing_token_is_forbidden() {
        let (app, _, _) = app();
        let (cookie, _) = fetch_token(&app).await;

        let response = post_contact(&app, Some(&cookie), contact_body(None)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "CSRF token missing");
    }

    #[tokio::test]
    async fn test_wrong_token_is_forbidden() {
        let (app, _, _) = app();
        let (cookie, _) = fetch_token(&app).await;

        let response = post_contact(&app, Some(&cookie), contact_body(Some("deadbeef"))).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid CSRF token");
    }

    #[tokio::test]
    async fn test_token_without_session_is_forbidden() {
        let (app, _, _) = app();
        let (_, token) = fetch_token(&app).await;

        let response = post_contact(&app, None, contact_body(Some(&token))).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_token_in_header_is_accepted() {
        let (app, _, _) = app();
        let (cookie, token) = fetch_token(&app).await;

        let request = Request::post("/api/contact")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, &cookie)
            .header("X-CSRF-Token", &token)
            .body(Body::from(contact_body(None).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_token_is_forbidden() {
        let (app, _, clock) = app();
        let (cookie, token) = fetch_token(&app).await;

        clock.advance(Duration::seconds(3601));
        let response = post_contact(&app, Some(&cookie), contact_body(Some(&token))).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_session_spacing() {
        let (app, _, clock) = app();
        let (cookie, token) = fetch_token(&app).await;
        let response = post_contact(&app, Some(&cookie), contact_body(Some(&token))).await;
        let next = body_json(response).await["csrf_token"]
            .as_str()
            .unwrap()
            .to_string();

        clock.advance(Duration::seconds(30));
        let response = post_contact(&app, Some(&cookie), contact_body(Some(&next))).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        let body = body_json(response).await;
        assert_eq!(body["error"], "Please wait before submitting again");
    }

    #[tokio::test]
    async fn test_ip_window_limit() {
        let (app, _, clock) = app();

        for _ in 0..5 {
            let (cookie, token) = fetch_token(&app).await;
            let response = post_contact(&app, Some(&cookie), contact_body(Some(&token))).await;
            assert_eq!(response.status(), StatusCode::OK);
            clock.advance(Duration::seconds(10));
        }

        let (cookie, token) = fetch_token(&app).await;
        let response = post_contact(&app, Some(&cookie), contact_body(Some(&token))).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(body["retryAfter"], 550);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["window"], 10);
        assert_eq!(
            body["message"],
            "Too many submissions. Please wait 10 minutes before trying again."
        );
    }

    #[tokio::test]
    async fn test_invalid_fields_are_rejected_without_consuming_quota() {
        let (app, state, _) = app();
        let (cookie, token) = fetch_token(&app).await;
        let mut body = contact_body(Some(&token));
        body["email"] = json!("not an email");

        let response = post_contact(&app, Some(&cookie), body).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["fields"]["email"], "Please enter a valid email address");
        assert_eq!(state.ip_limiter.check(CLIENT).remaining, 5);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_state() {
        let (app, state, clock) = app();
        let (cookie, token) = fetch_token(&app).await;
        post_contact(&app, Some(&cookie), contact_body(Some(&token))).await;

        clock.advance(Duration::hours(2));
        state.cleanup();

        assert!(state.ip_limiter.is_empty());
        assert!(state.sessions.is_empty());
    }
}
