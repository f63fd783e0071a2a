//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{Submission, Transport, TransportError, TransportReply};

/// Header carrying the token alongside the body field.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Posts submissions as JSON to a single endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, submission: &Submission) -> Result<TransportReply, TransportError> {
        debug!(endpoint = %self.endpoint, "Posting submission");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CSRF_HEADER, &submission.csrf_token)
            .json(submission)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Submission request failed");
                TransportError::Network(e)
            })?;

        let status = response.status();
        match status {
            StatusCode::FORBIDDEN => return Err(TransportError::Forbidden),
            StatusCode::TOO_MANY_REQUESTS => return Err(TransportError::TooManyRequests),
            s if !s.is_success() => {
                warn!(status = s.as_u16(), "Backend returned an error status");
                return Err(TransportError::Status(s.as_u16()));
            }
            _ => {}
        }

        let body = response.bytes().await.map_err(TransportError::Network)?;
        let reply: TransportReply =
            serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))?;

        if !reply.success {
            return Err(TransportError::Rejected(reply.message));
        }

        Ok(reply)
    }
}
