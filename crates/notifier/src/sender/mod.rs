//! Channel senders.
//!
//! A sender turns an already rendered message into one outbound request. It
//! never retries on its own; the worker decides what happens next based on
//! the [`SendError`] class.

mod email;
mod telegram;
mod webhook;

pub use email::EmailSender;
pub use telegram::TelegramSender;
pub use webhook::WebhookSender;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use beacon_common::types::ChannelType;

use crate::error::SendError;

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// A rendered message addressed to one channel target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery backend for one channel type.
#[async_trait]
pub trait Sender: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    async fn send(&self, notification: &Notification) -> Result<(), SendError>;
}

/// Build the shared HTTP client with a request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, SendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SendError::Other(format!("failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP response to a [`SendError`].
pub fn classify_status(status: StatusCode, body: &str) -> SendError {
    let body = clip(body);
    match status.as_u16() {
        401 | 403 => SendError::Unauthorized(body),
        404 | 410 => SendError::NotFound(body),
        408 => SendError::Timeout(body),
        429 => SendError::RateLimited { retry_after: None },
        code if status.is_server_error() => SendError::Server { status: code, body },
        code if status.is_client_error() => SendError::Rejected(format!("{}: {}", code, body)),
        code => SendError::Other(format!("unexpected status {}: {}", code, body)),
    }
}

/// Map a transport failure to a [`SendError`].
pub fn classify_transport(err: reqwest::Error) -> SendError {
    if err.is_timeout() {
        SendError::Timeout(err.to_string())
    } else {
        SendError::Network(err.to_string())
    }
}

fn clip(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        let clipped: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{}...", clipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_permanent() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad token"),
            SendError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            SendError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::GONE, ""),
            SendError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "invalid"),
            SendError::Rejected(_)
        ));
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_retryable());
    }

    #[test]
    fn test_classify_status_retryable() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            SendError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT, ""),
            SendError::Timeout(_)
        ));
        match classify_status(StatusCode::BAD_GATEWAY, "upstream down") {
            SendError::Server { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_body_is_clipped() {
        let long = "x".repeat(2_000);
        match classify_status(StatusCode::SERVICE_UNAVAILABLE, &long) {
            SendError::Server { body, .. } => {
                assert_eq!(body.chars().count(), MAX_ERROR_BODY + 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
