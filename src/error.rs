//! Error types for the contact gate.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::transport::TransportError;
use crate::validation::FieldErrors;

/// Crate-level error for configuration, I/O and server setup.
#[derive(Error, Debug)]
pub enum ContactGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for ContactGateError {
    fn from(e: ::config::ConfigError) -> Self {
        ContactGateError::Config(e.to_string())
    }
}

/// Result type alias for contact gate operations.
pub type Result<T> = std::result::Result<T, ContactGateError>;

/// Why a submission was refused by the gate.
///
/// Exactly one of these (or a success) is produced per call to
/// [`SubmissionGate::submit`](crate::gate::SubmissionGate::submit). The
/// `Display` output is the text shown to the user.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// One or more fields failed validation. The user must correct them.
    #[error("Please fix the errors above before submitting.")]
    FieldValidation(FieldErrors),

    /// The submission quota is exhausted until `reset_time`.
    #[error("{message}")]
    RateLimited {
        reset_time: DateTime<Utc>,
        retry_after: Duration,
        message: String,
    },

    /// The token was missing, expired, or did not match.
    #[error("Security validation failed. Please refresh the page and try again.")]
    SecurityValidation,

    /// The transport failed. The user may retry immediately.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SubmitError {
    /// Short machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::FieldValidation(_) => "field_validation",
            SubmitError::RateLimited { .. } => "rate_limited",
            SubmitError::SecurityValidation => "security_validation",
            SubmitError::Transport(_) => "transport",
        }
    }
}
