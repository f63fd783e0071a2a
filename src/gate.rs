//! The submission gate: validation, security checks and dispatch.
//!
//! [`SubmissionGate::submit`] is the single entry point. It runs, in order:
//!
//! 1. field validation (does not touch rate-limit quota),
//! 2. the rate limit check,
//! 3. the token check,
//! 4. dispatch through the transport under a timeout,
//!
//! and only after a successful dispatch records the submission and rotates
//! the token. A failed dispatch leaves all state untouched so the user can
//! retry without being penalised twice.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::clock::{self, Clock};
use crate::config::ContactGateConfig;
use crate::error::SubmitError;
use crate::ratelimit::{RateLimitDecision, RateLimitPolicy};
use crate::sanitize::Sanitizer;
use crate::session::Session;
use crate::token::default_token_ttl;
use crate::transport::{HttpTransport, MockTransport, Submission, Transport, TransportError};
use crate::validation::{self, ContactForm};

/// Default bound on a single dispatch.
pub const DEFAULT_TRANSPORT_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSuccess {
    /// User-facing confirmation
    pub message: String,
    /// Fresh token to re-inject into the form
    pub token: String,
    /// Submissions left in the current window
    pub remaining: u32,
    /// Token issued by the backend, if it sent one
    pub server_token: Option<String>,
}

/// Kind of a rendered form message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
}

/// What the form-message renderer displays after a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormMessage {
    pub text: String,
    pub kind: MessageKind,
}

impl FormMessage {
    pub fn from_outcome(outcome: &Result<SubmitSuccess, SubmitError>) -> Self {
        match outcome {
            Ok(success) => Self {
                text: success.message.clone(),
                kind: MessageKind::Success,
            },
            Err(err @ SubmitError::FieldValidation(_)) => Self {
                text: err.to_string(),
                kind: MessageKind::Error,
            },
            Err(err) => Self {
                text: format!(
                    "Failed to send message\n\n{}\n\nPlease try again or contact me directly via email.",
                    err
                ),
                kind: MessageKind::Error,
            },
        }
    }
}

/// Builder for [`SubmissionGate`].
pub struct GateBuilder {
    transport: Box<dyn Transport>,
    policy: RateLimitPolicy,
    token_ttl: Duration,
    timeout: StdDuration,
    sanitizer: Option<Arc<dyn Sanitizer>>,
    clock: Arc<dyn Clock>,
}

impl GateBuilder {
    pub fn policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supply the optional sanitizing capability.
    pub fn sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> SubmissionGate {
        let session = Session::new(self.policy, self.token_ttl, self.clock.clone());
        SubmissionGate {
            session,
            transport: self.transport,
            policy: self.policy,
            token_ttl: self.token_ttl,
            timeout: self.timeout,
            sanitizer: self.sanitizer,
            clock: self.clock,
        }
    }
}

/// Orchestrates one client session's contact form submissions.
///
/// `submit` takes `&mut self`, so at most one submission per gate can be
/// in flight.
pub struct SubmissionGate {
    session: Session,
    transport: Box<dyn Transport>,
    policy: RateLimitPolicy,
    token_ttl: Duration,
    timeout: StdDuration,
    sanitizer: Option<Arc<dyn Sanitizer>>,
    clock: Arc<dyn Clock>,
}

impl SubmissionGate {
    pub fn builder(transport: impl Transport + 'static) -> GateBuilder {
        GateBuilder {
            transport: Box::new(transport),
            policy: RateLimitPolicy::default(),
            token_ttl: default_token_ttl(),
            timeout: DEFAULT_TRANSPORT_TIMEOUT,
            sanitizer: None,
            clock: clock::system(),
        }
    }

    /// Build a gate from configuration.
    ///
    /// Uses the HTTP transport when an endpoint is configured and the mock
    /// transport otherwise.
    pub fn from_config(config: &ContactGateConfig) -> GateBuilder {
        let builder = match &config.transport.endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Using HTTP transport");
                Self::builder(HttpTransport::new(endpoint.clone()))
            }
            None => {
                info!("No endpoint configured, using mock transport");
                Self::builder(MockTransport::new(config.transport.mock_delay()))
            }
        };

        builder
            .policy(config.rate_limiting.policy())
            .token_ttl(config.token.ttl())
            .timeout(config.transport.timeout())
    }

    /// Token to inject into the rendered form.
    pub fn token(&mut self) -> String {
        self.session.tokens.get_token()
    }

    /// Current rate limit decision, without side effects.
    pub fn rate_limit(&self) -> RateLimitDecision {
        self.session.limiter.check_limit()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Tear down the current session and start a fresh one.
    pub fn end_session(&mut self) {
        debug!(session = %self.session.id(), "Ending session");
        self.session = Session::new(self.policy, self.token_ttl, self.clock.clone());
    }

    /// Validate, check and dispatch one form submission.
    #[instrument(skip(self, form), fields(session = %self.session.id()))]
    pub async fn submit(&mut self, form: &ContactForm) -> Result<SubmitSuccess, SubmitError> {
        let outcome = self.run_pipeline(form).await;
        if let Err(err) = &outcome {
            debug!(kind = err.kind(), "Submission refused");
        }
        outcome
    }

    async fn run_pipeline(&mut self, form: &ContactForm) -> Result<SubmitSuccess, SubmitError> {
        let fields = validation::validate(form).map_err(|errors| {
            debug!(invalid = errors.len(), "Field validation failed");
            SubmitError::FieldValidation(errors)
        })?;

        let decision = self.session.limiter.check_limit();
        if !decision.allowed {
            let message = self.session.limiter.limit_message(&decision);
            warn!(reason = ?decision.reason, reset_time = %decision.reset_time, "Submission rate limited");
            return Err(SubmitError::RateLimited {
                retry_after: decision.retry_after(self.clock.now()),
                reset_time: decision.reset_time,
                message,
            });
        }

        let token = match form.csrf_token.as_deref() {
            Some(token) if self.session.tokens.validate_token(token) => token.to_string(),
            _ => {
                warn!("Token missing, expired or mismatched");
                return Err(SubmitError::SecurityValidation);
            }
        };

        let clean = |value: String| match &self.sanitizer {
            Some(sanitizer) => sanitizer.sanitize(&value),
            None => value,
        };
        let submission = Submission {
            name: clean(fields.name),
            email: clean(fields.email),
            subject: clean(fields.subject),
            message: clean(fields.message),
            csrf_token: token,
        };

        let reply = match tokio::time::timeout(self.timeout, self.transport.deliver(&submission)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(error = %e, "Transport failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Transport timed out");
                return Err(TransportError::Timeout.into());
            }
        };

        self.session.limiter.record_submission();
        let token = self.session.tokens.rotate_token();
        let remaining = self.session.limiter.check_limit().remaining;

        info!(remaining, "Submission accepted");

        Ok(SubmitSuccess {
            message: reply.message,
            token,
            remaining,
            server_token: reply.csrf_token,
        })
    }
}
