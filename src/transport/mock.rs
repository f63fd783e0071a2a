//! Development transport used when no backend endpoint is configured.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{Submission, Transport, TransportError, TransportReply};

/// Delay before the mock resolves.
pub const DEFAULT_MOCK_DELAY: Duration = Duration::from_millis(1500);

/// Accepts every submission after a fixed delay. Nothing is sent anywhere.
#[derive(Debug, Clone)]
pub struct MockTransport {
    delay: Duration,
}

impl MockTransport {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_DELAY)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn deliver(&self, submission: &Submission) -> Result<TransportReply, TransportError> {
        tokio::time::sleep(self.delay).await;

        info!(
            subject = %submission.subject,
            chars = submission.message.chars().count(),
            "Mock transport accepted submission"
        );

        Ok(TransportReply {
            success: true,
            message: "Message received! (Mock response - no email sent)".to_string(),
            csrf_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_resolves_after_delay() {
        let transport = MockTransport::default();
        let submission = Submission {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            message: "A message body.".to_string(),
            csrf_token: "t".to_string(),
        };

        let start = tokio::time::Instant::now();
        let reply = transport.deliver(&submission).await.unwrap();

        assert!(reply.success);
        assert!(start.elapsed() >= DEFAULT_MOCK_DELAY);
    }
}
