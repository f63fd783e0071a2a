//! Dispatch of accepted submissions to a backend.

mod http;
mod mock;

pub use http::{HttpTransport, CSRF_HEADER};
pub use mock::{MockTransport, DEFAULT_MOCK_DELAY};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub csrf_token: String,
}

/// JSON body returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

/// Ways a dispatch can fail.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Security validation failed. Please refresh and try again.")]
    Forbidden,

    #[error("Too many requests. Please wait a moment and try again.")]
    TooManyRequests,

    #[error("Server error: {0}")]
    Status(u16),

    #[error("Failed to send message: {0}")]
    Rejected(String),

    #[error("Failed to send message. Please try again.")]
    Network(#[source] reqwest::Error),

    #[error("Unexpected response from server: {0}")]
    Decode(String),

    #[error("The server did not respond in time. Please try again.")]
    Timeout,
}

/// Something that can deliver a submission.
///
/// Implementations must not retry on their own; retries are always
/// initiated by the user.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, submission: &Submission) -> Result<TransportReply, TransportError>;
}
