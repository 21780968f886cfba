//! Shared application state for the Axum API server.

use std::sync::Arc;
use std::time::Duration;

use beacon_common::config::AppConfig;
use beacon_notifier::{
    Dispatcher, EmailSender, NotificationMetrics, NotificationRepository, Notifier, SendError,
    Sender, TelegramSender, WebhookSender,
};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn NotificationRepository>,
    /// Entry point for event lifecycle handlers mounted on this router:
    /// they call the `on_*` hooks after committing the
    /// event change. Shares the repository with the queue routes.
    pub notifier: Arc<Notifier>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<NotificationMetrics>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<NotificationMetrics>,
        config: AppConfig,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(
            repo.clone(),
            config.notify_max_attempts,
            config.public_url.clone(),
        ));
        Self {
            repo,
            notifier,
            dispatcher,
            metrics,
            config,
        }
    }
}

/// Build one sender per channel type whose credentials are configured.
///
/// Webhooks need no credentials and are always available.
pub fn senders_from_config(config: &AppConfig) -> Result<Vec<Arc<dyn Sender>>, SendError> {
    let timeout = Duration::from_secs(config.sender_timeout_secs);
    let mut senders: Vec<Arc<dyn Sender>> = vec![Arc::new(WebhookSender::new(timeout)?)];

    match &config.telegram_bot_token {
        Some(token) if !token.trim().is_empty() => {
            senders.push(Arc::new(TelegramSender::new(token.trim(), timeout)?));
        }
        _ => tracing::warn!("TELEGRAM_BOT_TOKEN not set, telegram channels will not be served"),
    }

    match (&config.resend_api_key, &config.email_from) {
        (Some(key), Some(from)) if !key.trim().is_empty() && !from.trim().is_empty() => {
            senders.push(Arc::new(EmailSender::new(key.trim(), from.trim(), timeout)?));
        }
        _ => tracing::warn!(
            "RESEND_API_KEY or EMAIL_FROM not set, email channels will not be served"
        ),
    }

    Ok(senders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::types::ChannelType;

    fn channel_types(senders: &[Arc<dyn Sender>]) -> Vec<ChannelType> {
        senders.iter().map(|s| s.channel_type()).collect()
    }

    #[test]
    fn test_webhook_sender_always_present() {
        let senders = senders_from_config(&AppConfig::default()).unwrap();
        assert_eq!(channel_types(&senders), vec![ChannelType::Webhook]);
    }

    #[test]
    fn test_senders_follow_credentials() {
        let config = AppConfig {
            telegram_bot_token: Some("123:abc".to_string()),
            resend_api_key: Some("re_test".to_string()),
            email_from: Some("status@example.com".to_string()),
            ..Default::default()
        };
        let senders = senders_from_config(&config).unwrap();
        assert_eq!(
            channel_types(&senders),
            vec![ChannelType::Webhook, ChannelType::Telegram, ChannelType::Email]
        );
    }

    #[test]
    fn test_email_requires_sender_address() {
        let config = AppConfig {
            resend_api_key: Some("re_test".to_string()),
            ..Default::default()
        };
        let senders = senders_from_config(&config).unwrap();
        assert!(!channel_types(&senders).contains(&ChannelType::Email));
    }
}
