//! Generic HTTP webhook sender.
//!
//! The rendered body is already a JSON document; it is posted unchanged with
//! `Content-Type: application/json`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header};

use beacon_common::types::ChannelType;

use super::{Notification, Sender, classify_status, classify_transport, http_client};
use crate::error::SendError;

pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(timeout: Duration) -> Result<Self, SendError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

/// Parse a webhook target, accepting only absolute http(s) URLs.
pub(crate) fn parse_target(target: &str) -> Result<Url, SendError> {
    let url = Url::parse(target.trim())
        .map_err(|e| SendError::InvalidRecipient(format!("invalid webhook URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SendError::InvalidRecipient(format!(
            "unsupported webhook scheme '{}'",
            scheme
        ))),
    }
}

#[async_trait]
impl Sender for WebhookSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let url = parse_target(&notification.to)?;
        let host = url.host_str().unwrap_or_default().to_string();

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(notification.body.clone())
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(host = %host, "Webhook delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(host = %host, status = %status, "Webhook endpoint returned error");
        Err(classify_status(status, &body))
    }
}
