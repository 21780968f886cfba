//! Email delivery through the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use beacon_common::types::ChannelType;

use super::{Notification, Sender, classify_status, classify_transport, http_client};
use crate::error::SendError;

const DEFAULT_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct EmailSender {
    client: Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl EmailSender {
    pub fn new(
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            from: from.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Cheap structural check: one `@` with a non-empty local part and a dotted domain.
pub(crate) fn is_valid_address(address: &str) -> bool {
    let address = address.trim();
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[async_trait]
impl Sender for EmailSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let to = notification.to.trim();
        if !is_valid_address(to) {
            return Err(SendError::InvalidRecipient(format!(
                "'{}' is not an email address",
                to
            )));
        }

        let request = SendEmailRequest {
            from: &self.from,
            to: [to],
            subject: &notification.subject,
            text: &notification.body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = %to, "Email accepted by provider");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(to = %to, status = %status, "Email provider rejected request");
        Err(classify_status(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("ops@example.com"));
        assert!(is_valid_address(" ops+alerts@mail.example.org "));
        assert!(!is_valid_address("ops.example.com"));
        assert!(!is_valid_address("@example.com"));
        assert!(!is_valid_address("ops@localhost"));
        assert!(!is_valid_address("ops@@example.com"));
        assert!(!is_valid_address("o ps@example.com"));
        assert!(!is_valid_address(""));
    }

    #[tokio::test]
    async fn test_invalid_recipient_fails_before_request() {
        let sender = EmailSender::new("key", "status@example.com", Duration::from_secs(1))
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/emails");
        let result = sender
            .send(&Notification {
                to: "not-an-address".to_string(),
                subject: "s".to_string(),
                body: "b".to_string(),
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, SendError::InvalidRecipient(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_shape() {
        let request = SendEmailRequest {
            from: "status@example.com",
            to: ["ops@example.com"],
            subject: "Incident: API down",
            text: "body",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["to"][0], "ops@example.com");
        assert_eq!(json["subject"], "Incident: API down");
    }
}
