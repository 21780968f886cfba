//! Immediate, best-effort delivery that bypasses the queue.
//!
//! Used for verification and test messages, where the caller wants an answer
//! now and a retry schedule would only get in the way.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use beacon_common::types::{Channel, ChannelType};

use crate::error::NotifierError;
use crate::repository::NotificationRepository;
use crate::sender::{Notification, Sender};

/// Per-call delivery counts of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
    /// Channels whose type has no registered sender.
    pub skipped: usize,
}

pub struct Dispatcher {
    repo: Arc<dyn NotificationRepository>,
    senders: HashMap<ChannelType, Arc<dyn Sender>>,
}

impl Dispatcher {
    /// Senders are keyed by their own channel type; a later sender replaces an
    /// earlier one of the same type.
    pub fn new(repo: Arc<dyn NotificationRepository>, senders: Vec<Arc<dyn Sender>>) -> Self {
        let senders = senders
            .into_iter()
            .map(|sender| (sender.channel_type(), sender))
            .collect();
        Self { repo, senders }
    }

    pub fn sender(&self, channel_type: ChannelType) -> Option<Arc<dyn Sender>> {
        self.senders.get(&channel_type).cloned()
    }

    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut types: Vec<ChannelType> = self.senders.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Send to every current subscriber of `service_ids` right away.
    ///
    /// Individual failures are logged and counted, never retried.
    pub async fn dispatch(
        &self,
        service_ids: &[Uuid],
        subject: &str,
        body: &str,
    ) -> Result<DispatchSummary, NotifierError> {
        let subscribers = self.repo.find_subscribers(service_ids).await?;
        let mut summary = DispatchSummary::default();

        for subscriber in subscribers {
            let Some(sender) = self.sender(subscriber.channel_type) else {
                tracing::warn!(
                    channel_id = %subscriber.channel_id,
                    channel_type = %subscriber.channel_type,
                    "No sender registered, skipping channel"
                );
                summary.skipped += 1;
                continue;
            };

            let notification = Notification {
                to: subscriber.recipient(),
                subject: subject.to_string(),
                body: body.to_string(),
            };

            match sender.send(&notification).await {
                Ok(()) => summary.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        channel_id = %subscriber.channel_id,
                        channel_type = %subscriber.channel_type,
                        error = %e,
                        "Immediate dispatch failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            delivered = summary.delivered,
            failed = summary.failed,
            skipped = summary.skipped,
            "Dispatch complete"
        );
        Ok(summary)
    }

    /// Send one message to one channel, whether or not it is verified.
    pub async fn send_to_channel(
        &self,
        channel: &Channel,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifierError> {
        let sender = self
            .sender(channel.channel_type)
            .ok_or(NotifierError::NoSender(channel.channel_type))?;

        let notification = Notification {
            to: channel.recipient(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        sender.send(&notification).await?;

        tracing::info!(
            channel_id = %channel.id,
            channel_type = %channel.channel_type,
            "Direct message sent"
        );
        Ok(())
    }
}
