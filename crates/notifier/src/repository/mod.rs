//! Durable storage seam of the pipeline.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use beacon_common::types::{Channel, Service, ServiceGroup, SubscriberChannel};

use crate::error::RepositoryError;
use crate::queue::{NewQueueItem, QueueItem, QueueStats, QueueStatus};

/// Queue, channel and subscriber storage shared by the notifier, the workers
/// and the dispatcher.
///
/// Every queue transition checks the item's current status, so a transition
/// applied to an item that is not in the expected state is a no-op.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, RepositoryError>;

    /// Insert all items or none.
    async fn enqueue_batch(&self, items: Vec<NewQueueItem>) -> Result<usize, RepositoryError>;

    /// Atomically move up to `limit` due `pending` items to `processing` and
    /// return them, oldest `next_attempt_at` first. An item is returned to at
    /// most one caller.
    async fn claim_due(&self, limit: u32) -> Result<Vec<QueueItem>, RepositoryError>;

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Terminal failure. Does not change `attempts`.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError>;

    /// Back to `pending`, with `attempts + 1` and a new due time.
    async fn mark_for_retry(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, RepositoryError>;

    async fn get_event_subscribers(&self, event_id: Uuid) -> Result<Vec<Uuid>, RepositoryError>;

    /// Append channel ids to the event's frozen subscriber set, skipping ones
    /// already present. Returns how many were new.
    async fn add_event_subscribers(
        &self,
        event_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<usize, RepositoryError>;

    /// Enabled and verified channels subscribed to any of `service_ids`,
    /// either explicitly or through subscribe-all.
    async fn find_subscribers(
        &self,
        service_ids: &[Uuid],
    ) -> Result<Vec<SubscriberChannel>, RepositoryError>;

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, RepositoryError>;

    async fn get_group(&self, id: Uuid) -> Result<Option<ServiceGroup>, RepositoryError>;

    async fn get_item(&self, id: Uuid) -> Result<Option<QueueItem>, RepositoryError>;

    /// Items in `status`, most recently updated first.
    async fn list_items(
        &self,
        status: QueueStatus,
        limit: u32,
    ) -> Result<Vec<QueueItem>, RepositoryError>;

    async fn queue_stats(&self) -> Result<QueueStats, RepositoryError>;

    /// Move a `failed` item back to `pending`, due now, with attempts reset.
    /// Returns false when the item is not in `failed`.
    async fn requeue(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Return items stuck in `processing` since before `older_than` to `pending`.
    async fn recover_stale(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
