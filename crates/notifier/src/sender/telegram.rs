//! Telegram Bot API sender (`POST /bot<token>/sendMessage`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use beacon_common::types::ChannelType;

use super::{Notification, Sender, classify_status, classify_transport, http_client};
use crate::error::SendError;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Error envelope returned by the Bot API.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiErrorParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

pub struct TelegramSender {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramSender {
    pub fn new(bot_token: impl Into<String>, timeout: Duration) -> Result<Self, SendError> {
        Ok(Self {
            client: http_client(timeout)?,
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the sender at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Classify a failed `sendMessage` call from its status and raw body.
fn classify_response(status: StatusCode, body: &str) -> SendError {
    let parsed: ApiError = serde_json::from_str(body).unwrap_or_default();
    let description = parsed.description.unwrap_or_else(|| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return SendError::RateLimited {
            retry_after: parsed
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs),
        };
    }

    if status == StatusCode::BAD_REQUEST && description.to_lowercase().contains("chat not found") {
        return SendError::NotFound(description);
    }

    classify_status(status, &description)
}

#[async_trait]
impl Sender for TelegramSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let chat_id = notification.to.trim();
        if chat_id.is_empty() {
            return Err(SendError::InvalidRecipient("empty chat id".to_string()));
        }

        let payload = json!({
            "chat_id": chat_id,
            "text": notification.body,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(chat_id = %chat_id, "Telegram message sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(chat_id = %chat_id, status = %status, "Telegram sendMessage failed");
        Err(classify_response(status, &body))
    }
}
