//! PostgreSQL implementation of [`NotificationRepository`].
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` so concurrent pollers, in this
//! process or another, never receive the same item.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use beacon_common::types::{Channel, ChannelType, Service, ServiceGroup, SubscriberChannel};

use super::NotificationRepository;
use crate::error::RepositoryError;
use crate::payload::{MessageKind, NotificationPayload};
use crate::queue::{NewQueueItem, QueueItem, QueueStats, QueueStatus};

/// Row struct for `notification_queue`.
#[derive(sqlx::FromRow, Debug)]
struct QueueItemRow {
    id: Uuid,
    event_id: Uuid,
    channel_id: Uuid,
    kind: MessageKind,
    payload: Json<NotificationPayload>,
    status: QueueStatus,
    attempts: i32,
    max_attempts: i32,
    next_attempt_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl From<QueueItemRow> for QueueItem {
    fn from(row: QueueItemRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            channel_id: row.channel_id,
            kind: row.kind,
            payload: row.payload.0,
            status: row.status,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sent_at: row.sent_at,
        }
    }
}

/// Row struct for a channel joined with its explicit subscriptions.
#[derive(sqlx::FromRow, Debug)]
struct ChannelRow {
    id: Uuid,
    user_id: Uuid,
    channel_type: ChannelType,
    target: String,
    enabled: bool,
    verified: bool,
    subscribe_all_services: bool,
    service_ids: Vec<Uuid>,
    owner_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            channel_type: row.channel_type,
            target: row.target,
            enabled: row.enabled,
            verified: row.verified,
            subscribe_all_services: row.subscribe_all_services,
            service_ids: row.service_ids.into_iter().collect::<HashSet<_>>(),
            owner_email: row.owner_email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const INSERT_ITEM: &str = r#"
    INSERT INTO notification_queue (id, event_id, channel_id, kind, payload, status, max_attempts)
    VALUES ($1, $2, $3, $4, $5, 'pending', $6)
    RETURNING *
"#;

#[derive(Debug, Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, RepositoryError> {
        let row: QueueItemRow = sqlx::query_as(INSERT_ITEM)
            .bind(item.id)
            .bind(item.event_id)
            .bind(item.channel_id)
            .bind(item.kind)
            .bind(Json(&item.payload))
            .bind(item.max_attempts)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn enqueue_batch(&self, items: Vec<NewQueueItem>) -> Result<usize, RepositoryError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for item in &items {
            sqlx::query(INSERT_ITEM)
                .bind(item.id)
                .bind(item.event_id)
                .bind(item.channel_id)
                .bind(item.kind)
                .bind(Json(&item.payload))
                .bind(item.max_attempts)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(items.len())
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<QueueItem>, RepositoryError> {
        let rows: Vec<QueueItemRow> = sqlx::query_as(
            r#"
            UPDATE notification_queue
            SET status = 'processing', updated_at = NOW()
            WHERE id IN (
                SELECT id
                FROM notification_queue
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the subquery order.
        let mut items: Vec<QueueItem> = rows.into_iter().map(QueueItem::from).collect();
        items.sort_by_key(|item| item.next_attempt_at);
        Ok(items)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = 'sent', sent_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = 'failed', last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_for_retry(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = 'pending',
                attempts = attempts + 1,
                last_error = $2,
                next_attempt_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, RepositoryError> {
        let row: Option<ChannelRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.user_id, c.channel_type, c.target, c.enabled, c.verified,
                   c.subscribe_all_services, c.created_at, c.updated_at,
                   u.email AS owner_email,
                   COALESCE(
                       ARRAY_AGG(cs.service_id) FILTER (WHERE cs.service_id IS NOT NULL),
                       '{}'
                   ) AS service_ids
            FROM notification_channels c
            JOIN users u ON u.id = c.user_id
            LEFT JOIN channel_subscriptions cs ON cs.channel_id = c.id
            WHERE c.id = $1
            GROUP BY c.id, u.email
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Channel::from))
    }

    async fn get_event_subscribers(&self, event_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT channel_id FROM event_subscribers WHERE event_id = $1 ORDER BY created_at, channel_id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn add_event_subscribers(
        &self,
        event_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<usize, RepositoryError> {
        if channel_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO event_subscribers (event_id, channel_id)
            SELECT $1, channel_id FROM UNNEST($2::uuid[]) AS t(channel_id)
            ON CONFLICT (event_id, channel_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(channel_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn find_subscribers(
        &self,
        service_ids: &[Uuid],
    ) -> Result<Vec<SubscriberChannel>, RepositoryError> {
        let subscribers: Vec<SubscriberChannel> = sqlx::query_as(
            r#"
            SELECT c.id AS channel_id, c.channel_type, c.target, u.email AS user_email
            FROM notification_channels c
            JOIN users u ON u.id = c.user_id
            WHERE c.enabled AND c.verified
              AND (
                  c.subscribe_all_services
                  OR EXISTS (
                      SELECT 1 FROM channel_subscriptions cs
                      WHERE cs.channel_id = c.id AND cs.service_id = ANY($1)
                  )
              )
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(service_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscribers)
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, RepositoryError> {
        let service: Option<Service> =
            sqlx::query_as("SELECT id, name, status FROM services WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(service)
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<ServiceGroup>, RepositoryError> {
        let group: Option<ServiceGroup> =
            sqlx::query_as("SELECT id, name FROM service_groups WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(group)
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<QueueItem>, RepositoryError> {
        let row: Option<QueueItemRow> =
            sqlx::query_as("SELECT * FROM notification_queue WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(QueueItem::from))
    }

    async fn list_items(
        &self,
        status: QueueStatus,
        limit: u32,
    ) -> Result<Vec<QueueItem>, RepositoryError> {
        let rows: Vec<QueueItemRow> = sqlx::query_as(
            "SELECT * FROM notification_queue WHERE status = $1 ORDER BY updated_at DESC LIMIT $2",
        )
        .bind(status)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(QueueItem::from).collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats, RepositoryError> {
        let rows: Vec<(QueueStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) AS count FROM notification_queue GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.add(status, count);
        }
        Ok(stats)
    }

    async fn requeue(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = 'pending', attempts = 0, next_attempt_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recover_stale(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = 'pending', updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
