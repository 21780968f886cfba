use std::time::Duration;

use beacon_common::error::AppError;
use beacon_common::types::ChannelType;
use thiserror::Error;

use crate::payload::MessageKind;

/// Failure reported by a [`Sender`](crate::sender::Sender).
///
/// Every variant carries an explicit retryability class. `Other` is the
/// catch-all for failures a sender could not classify and is retried.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("target not found: {0}")]
    NotFound(String),

    #[error("rejected by remote: {0}")]
    Rejected(String),

    #[error("rate limited by remote")]
    RateLimited { retry_after: Option<Duration> },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("remote server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

impl SendError {
    /// Whether waiting and trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::InvalidRecipient(_)
            | SendError::Unauthorized(_)
            | SendError::NotFound(_)
            | SendError::Rejected(_) => false,
            SendError::RateLimited { .. }
            | SendError::Timeout(_)
            | SendError::Network(_)
            | SendError::Server { .. }
            | SendError::Other(_) => true,
        }
    }
}

/// Failure to turn a payload into a channel message.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no template for {channel_type}/{kind}")]
    TemplateNotFound {
        channel_type: ChannelType,
        kind: MessageKind,
    },

    #[error("template set is incomplete, missing: {}", .0.join(", "))]
    MissingTemplates(Vec<String>),

    #[error("failed to encode message body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of the durable store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Aggregate error of the notification pipeline.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("no sender registered for channel type {0}")]
    NoSender(ChannelType),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<NotifierError> for AppError {
    fn from(err: NotifierError) -> Self {
        match err {
            NotifierError::Repository(e) => e.into(),
            NotifierError::Send(e) => AppError::Delivery(e.to_string()),
            NotifierError::NoSender(channel_type) => {
                AppError::Unavailable(format!("No sender configured for {} channels", channel_type))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!SendError::InvalidRecipient("x".into()).is_retryable());
        assert!(!SendError::Unauthorized("x".into()).is_retryable());
        assert!(!SendError::NotFound("x".into()).is_retryable());
        assert!(!SendError::Rejected("x".into()).is_retryable());
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(SendError::RateLimited { retry_after: None }.is_retryable());
        assert!(SendError::Timeout("x".into()).is_retryable());
        assert!(SendError::Network("x".into()).is_retryable());
        assert!(
            SendError::Server {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_unclassified_errors_default_to_retryable() {
        assert!(SendError::Other("something odd".into()).is_retryable());
    }

    #[test]
    fn test_missing_templates_message_lists_keys() {
        let err = RenderError::MissingTemplates(vec!["email_update".into(), "webhook_initial".into()]);
        assert_eq!(
            err.to_string(),
            "template set is incomplete, missing: email_update, webhook_initial"
        );
    }
}
