//! In-process [`NotificationRepository`] backed by a single mutex.
//!
//! Used by tests and by deployments without a database. The whole state sits
//! behind one lock, which makes `claim_due` trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use beacon_common::types::{Channel, Service, ServiceGroup, SubscriberChannel};

use super::NotificationRepository;
use crate::error::RepositoryError;
use crate::queue::{NewQueueItem, QueueItem, QueueStats, QueueStatus};

#[derive(Default)]
struct State {
    /// Insertion order is kept so claim ties resolve oldest first.
    items: Vec<QueueItem>,
    channels: Vec<Channel>,
    user_emails: HashMap<Uuid, String>,
    services: HashMap<Uuid, Service>,
    groups: HashMap<Uuid, ServiceGroup>,
    event_subscribers: HashMap<Uuid, Vec<Uuid>>,
}

impl State {
    fn item_mut(&mut self, id: Uuid, status: QueueStatus) -> Option<&mut QueueItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id && item.status == status)
    }

    fn channel_mut(&mut self, id: Uuid) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    state: Mutex<State>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a channel.
    pub async fn insert_channel(&self, channel: Channel) {
        let mut state = self.state.lock().await;
        state.channels.retain(|c| c.id != channel.id);
        state.channels.push(channel);
    }

    pub async fn remove_channel(&self, id: Uuid) {
        self.state.lock().await.channels.retain(|c| c.id != id);
    }

    pub async fn set_user_email(&self, user_id: Uuid, email: impl Into<String>) {
        self.state
            .lock()
            .await
            .user_emails
            .insert(user_id, email.into());
    }

    pub async fn set_channel_enabled(&self, id: Uuid, enabled: bool) {
        if let Some(channel) = self.state.lock().await.channel_mut(id) {
            channel.enabled = enabled;
            channel.updated_at = Utc::now();
        }
    }

    pub async fn set_channel_verified(&self, id: Uuid, verified: bool) {
        if let Some(channel) = self.state.lock().await.channel_mut(id) {
            channel.verified = verified;
            channel.updated_at = Utc::now();
        }
    }

    pub async fn insert_service(&self, service: Service) {
        self.state.lock().await.services.insert(service.id, service);
    }

    pub async fn insert_group(&self, group: ServiceGroup) {
        self.state.lock().await.groups.insert(group.id, group);
    }

    /// Snapshot of every queue item in insertion order.
    pub async fn items(&self) -> Vec<QueueItem> {
        self.state.lock().await.items.clone()
    }

    /// Make a pending item due immediately, skipping its backoff delay.
    pub async fn make_due(&self, id: Uuid) {
        if let Some(item) = self.state.lock().await.item_mut(id, QueueStatus::Pending) {
            item.next_attempt_at = Utc::now();
        }
    }

    /// Backdate a processing claim, as if its worker had died.
    pub async fn backdate_claim(&self, id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(item) = self.state.lock().await.item_mut(id, QueueStatus::Processing) {
            item.updated_at = updated_at;
        }
    }
}

fn materialize(item: NewQueueItem, now: DateTime<Utc>) -> QueueItem {
    QueueItem {
        id: item.id,
        event_id: item.event_id,
        channel_id: item.channel_id,
        kind: item.kind,
        payload: item.payload,
        status: QueueStatus::Pending,
        attempts: 0,
        max_attempts: item.max_attempts,
        next_attempt_at: now,
        last_error: None,
        created_at: now,
        updated_at: now,
        sent_at: None,
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, RepositoryError> {
        let item = materialize(item, Utc::now());
        self.state.lock().await.items.push(item.clone());
        Ok(item)
    }

    async fn enqueue_batch(&self, items: Vec<NewQueueItem>) -> Result<usize, RepositoryError> {
        let now = Utc::now();
        let count = items.len();
        let mut state = self.state.lock().await;
        state
            .items
            .extend(items.into_iter().map(|item| materialize(item, now)));
        Ok(count)
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<QueueItem>, RepositoryError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let mut due: Vec<usize> = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status == QueueStatus::Pending && item.next_attempt_at <= now)
            .map(|(index, _)| index)
            .collect();
        // Stable sort keeps insertion order among equal due times.
        due.sort_by_key(|&index| state.items[index].next_attempt_at);
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for index in due {
            let item = &mut state.items[index];
            item.status = QueueStatus::Processing;
            item.updated_at = now;
            claimed.push(item.clone());
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError> {
        let now = Utc::now();
        if let Some(item) = self.state.lock().await.item_mut(id, QueueStatus::Processing) {
            item.status = QueueStatus::Sent;
            item.sent_at = Some(now);
            item.updated_at = now;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        if let Some(item) = self.state.lock().await.item_mut(id, QueueStatus::Processing) {
            item.status = QueueStatus::Failed;
            item.last_error = Some(error.to_string());
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_for_retry(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(item) = self.state.lock().await.item_mut(id, QueueStatus::Processing) {
            item.status = QueueStatus::Pending;
            item.attempts += 1;
            item.last_error = Some(error.to_string());
            item.next_attempt_at = next_attempt_at;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.channels.iter().find(|c| c.id == id).map(|c| Channel {
            owner_email: state
                .user_emails
                .get(&c.user_id)
                .cloned()
                .or_else(|| c.owner_email.clone()),
            ..c.clone()
        }))
    }

    async fn get_event_subscribers(&self, event_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .event_subscribers
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_event_subscribers(
        &self,
        event_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<usize, RepositoryError> {
        let mut state = self.state.lock().await;
        let set = state.event_subscribers.entry(event_id).or_default();
        let mut added = 0;
        for id in channel_ids {
            if !set.contains(id) {
                set.push(*id);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn find_subscribers(
        &self,
        service_ids: &[Uuid],
    ) -> Result<Vec<SubscriberChannel>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .channels
            .iter()
            .filter(|c| c.is_deliverable() && c.is_subscribed_to_any(service_ids))
            .map(|c| SubscriberChannel {
                channel_id: c.id,
                channel_type: c.channel_type,
                target: c.target.clone(),
                user_email: state
                    .user_emails
                    .get(&c.user_id)
                    .cloned()
                    .or_else(|| c.owner_email.clone()),
            })
            .collect())
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, RepositoryError> {
        Ok(self.state.lock().await.services.get(&id).cloned())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<ServiceGroup>, RepositoryError> {
        Ok(self.state.lock().await.groups.get(&id).cloned())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<QueueItem>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|item| item.id == id).cloned())
    }

    async fn list_items(
        &self,
        status: QueueStatus,
        limit: u32,
    ) -> Result<Vec<QueueItem>, RepositoryError> {
        let state = self.state.lock().await;
        let mut items: Vec<QueueItem> = state
            .items
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn queue_stats(&self) -> Result<QueueStats, RepositoryError> {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for item in &state.items {
            stats.add(item.status, 1);
        }
        Ok(stats)
    }

    async fn requeue(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let now = Utc::now();
        match self.state.lock().await.item_mut(id, QueueStatus::Failed) {
            Some(item) => {
                item.status = QueueStatus::Pending;
                item.attempts = 0;
                item.next_attempt_at = now;
                item.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn recover_stale(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut recovered = 0;
        for item in state
            .items
            .iter_mut()
            .filter(|item| item.status == QueueStatus::Processing && item.updated_at < older_than)
        {
            item.status = QueueStatus::Pending;
            item.updated_at = now;
            recovered += 1;
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{EventSnapshot, MessageKind, NotificationPayload};
    use beacon_common::types::{ChannelType, EventStatus, EventType};
    use std::collections::HashSet;

    fn make_payload() -> NotificationPayload {
        NotificationPayload {
            kind: MessageKind::Initial,
            event: EventSnapshot {
                id: Uuid::new_v4(),
                title: "Outage".to_string(),
                event_type: EventType::Incident,
                status: EventStatus::Investigating,
                severity: None,
                message: "Down".to_string(),
                services: vec![],
                groups: vec![],
                started_at: None,
                scheduled_start_at: None,
                scheduled_end_at: None,
                created_at: Utc::now(),
            },
            changes: None,
            resolution: None,
            event_url: None,
            generated_at: Utc::now(),
        }
    }

    fn make_channel(subscribe_all: bool, services: &[Uuid]) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            channel_type: ChannelType::Webhook,
            target: "https://hooks.example.com".to_string(),
            enabled: true,
            verified: true,
            subscribe_all_services: subscribe_all,
            service_ids: services.iter().copied().collect::<HashSet<_>>(),
            owner_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = InMemoryNotificationRepository::new();
        let items: Vec<_> = (0..5)
            .map(|_| NewQueueItem::new(Uuid::new_v4(), Uuid::new_v4(), make_payload(), 5))
            .collect();
        repo.enqueue_batch(items).await.unwrap();

        let first = repo.claim_due(3).await.unwrap();
        let second = repo.claim_due(10).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);

        let first_ids: HashSet<Uuid> = first.iter().map(|i| i.id).collect();
        assert!(second.iter().all(|i| !first_ids.contains(&i.id)));
        assert!(repo.claim_due(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_increments_attempts_and_delays() {
        let repo = InMemoryNotificationRepository::new();
        let item = repo
            .enqueue(NewQueueItem::new(Uuid::new_v4(), Uuid::new_v4(), make_payload(), 5))
            .await
            .unwrap();
        repo.claim_due(1).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(60);
        repo.mark_for_retry(item.id, "timeout", later).await.unwrap();

        let stored = repo.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("timeout"));
        assert!(repo.claim_due(1).await.unwrap().is_empty());

        repo.make_due(item.id).await;
        assert_eq!(repo.claim_due(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transitions_require_processing() {
        let repo = InMemoryNotificationRepository::new();
        let item = repo
            .enqueue(NewQueueItem::new(Uuid::new_v4(), Uuid::new_v4(), make_payload(), 5))
            .await
            .unwrap();

        repo.mark_sent(item.id).await.unwrap();
        let stored = repo.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn test_add_event_subscribers_is_idempotent() {
        let repo = InMemoryNotificationRepository::new();
        let event = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(repo.add_event_subscribers(event, &[a, b]).await.unwrap(), 2);
        assert_eq!(repo.add_event_subscribers(event, &[a, b]).await.unwrap(), 0);
        assert_eq!(repo.get_event_subscribers(event).await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_find_subscribers_filters() {
        let repo = InMemoryNotificationRepository::new();
        let service = Uuid::new_v4();

        let explicit = make_channel(false, &[service]);
        let all = make_channel(true, &[]);
        let other = make_channel(false, &[Uuid::new_v4()]);
        let mut unverified = make_channel(false, &[service]);
        unverified.verified = false;
        let mut disabled = make_channel(true, &[]);
        disabled.enabled = false;

        for channel in [&explicit, &all, &other, &unverified, &disabled] {
            repo.insert_channel(channel.clone()).await;
        }
        repo.set_user_email(explicit.user_id, "ops@example.com").await;

        let found = repo.find_subscribers(&[service]).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|s| s.channel_id).collect();
        assert_eq!(ids, vec![explicit.id, all.id]);
        assert_eq!(found[0].user_email.as_deref(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn test_requeue_only_failed() {
        let repo = InMemoryNotificationRepository::new();
        let item = repo
            .enqueue(NewQueueItem::new(Uuid::new_v4(), Uuid::new_v4(), make_payload(), 5))
            .await
            .unwrap();
        assert!(!repo.requeue(item.id).await.unwrap());

        repo.claim_due(1).await.unwrap();
        repo.mark_for_retry(item.id, "x", Utc::now()).await.unwrap();
        repo.claim_due(1).await.unwrap();
        repo.mark_failed(item.id, "gone").await.unwrap();

        assert!(repo.requeue(item.id).await.unwrap());
        let stored = repo.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.attempts, 0);
        assert_eq!(stored.last_error.as_deref(), Some("gone"));
    }

    #[tokio::test]
    async fn test_recover_stale_claims() {
        let repo = InMemoryNotificationRepository::new();
        let item = repo
            .enqueue(NewQueueItem::new(Uuid::new_v4(), Uuid::new_v4(), make_payload(), 5))
            .await
            .unwrap();
        repo.claim_due(1).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        assert_eq!(repo.recover_stale(cutoff).await.unwrap(), 0);

        repo.backdate_claim(item.id, cutoff - chrono::Duration::minutes(1))
            .await;
        assert_eq!(repo.recover_stale(cutoff).await.unwrap(), 1);
        assert_eq!(repo.queue_stats().await.unwrap().pending, 1);
    }
}
