//! Entry point for domain events.
//!
//! Each handler decides whether the transition is notification-worthy,
//! resolves the recipient channels, snapshots a payload and enqueues one item
//! per channel in a single batch. Handlers never fail the caller: errors are
//! logged and reported as zero enqueued items.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use beacon_common::types::{
    AffectedService, ChangeSet, Event, EventScope, EventUpdate, Resolution, ServiceStatus,
};

use crate::error::RepositoryError;
use crate::payload::{
    EventSnapshot, GroupSnapshot, MessageKind, NotificationPayload, PayloadChanges,
    ResolutionInfo, ServiceSnapshot, ServiceTransition, StatusTransition, resolution_duration,
};
use crate::queue::NewQueueItem;
use crate::repository::NotificationRepository;

pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
    max_attempts: i32,
    public_url: Option<String>,
}

impl Notifier {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        max_attempts: i32,
        public_url: Option<String>,
    ) -> Self {
        Self {
            repo,
            max_attempts,
            public_url: public_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    /// A new incident or maintenance window was published.
    pub async fn on_created(&self, event: &Event, scope: &EventScope) -> usize {
        if !event.notify_subscribers {
            tracing::debug!(event_id = %event.id, "Subscriber notifications disabled for event");
            return 0;
        }
        self.try_created(event, scope)
            .await
            .unwrap_or_else(|e| log_failure(event.id, MessageKind::Initial, &e))
    }

    /// An update was posted on an existing event.
    pub async fn on_updated(
        &self,
        event: &Event,
        scope: &EventScope,
        update: &EventUpdate,
        changes: &ChangeSet,
    ) -> usize {
        if !update.notify_subscribers {
            tracing::debug!(
                event_id = %event.id,
                update_id = %update.id,
                "Update posted without notifying subscribers"
            );
            return 0;
        }
        self.try_updated(event, scope, update, changes)
            .await
            .unwrap_or_else(|e| log_failure(event.id, MessageKind::Update, &e))
    }

    /// An incident was resolved.
    pub async fn on_resolved(
        &self,
        event: &Event,
        scope: &EventScope,
        resolution: &Resolution,
    ) -> usize {
        self.try_closed(event, scope, resolution, MessageKind::Resolved)
            .await
            .unwrap_or_else(|e| log_failure(event.id, MessageKind::Resolved, &e))
    }

    /// A maintenance window finished.
    pub async fn on_completed(
        &self,
        event: &Event,
        scope: &EventScope,
        resolution: &Resolution,
    ) -> usize {
        self.try_closed(event, scope, resolution, MessageKind::Completed)
            .await
            .unwrap_or_else(|e| log_failure(event.id, MessageKind::Completed, &e))
    }

    /// A maintenance window was called off.
    pub async fn on_cancelled(&self, event: &Event, scope: &EventScope) -> usize {
        if !event.notify_subscribers {
            tracing::debug!(event_id = %event.id, "Subscriber notifications disabled for event");
            return 0;
        }
        self.try_cancelled(event, scope)
            .await
            .unwrap_or_else(|e| log_failure(event.id, MessageKind::Cancelled, &e))
    }

    async fn try_created(&self, event: &Event, scope: &EventScope) -> Result<usize, RepositoryError> {
        let subscribers = self.repo.find_subscribers(&scope.service_ids()).await?;
        if subscribers.is_empty() {
            tracing::debug!(event_id = %event.id, "No subscribers for affected services");
            return Ok(0);
        }

        let channel_ids: Vec<Uuid> = subscribers.iter().map(|s| s.channel_id).collect();
        self.repo.add_event_subscribers(event.id, &channel_ids).await?;

        let payload = self
            .build_payload(MessageKind::Initial, event, scope, None, None, None)
            .await;
        self.enqueue(event.id, &channel_ids, payload).await
    }

    async fn try_updated(
        &self,
        event: &Event,
        scope: &EventScope,
        update: &EventUpdate,
        changes: &ChangeSet,
    ) -> Result<usize, RepositoryError> {
        if !changes.services_added.is_empty() {
            let newcomers = self
                .repo
                .find_subscribers(&changes.added_service_ids())
                .await?;
            let ids: Vec<Uuid> = newcomers.iter().map(|s| s.channel_id).collect();
            let added = self.repo.add_event_subscribers(event.id, &ids).await?;
            if added > 0 {
                tracing::info!(event_id = %event.id, added, "Subscriber set extended");
            }
        }

        let recipients = self.repo.get_event_subscribers(event.id).await?;
        if recipients.is_empty() {
            return Ok(0);
        }

        let mut payload = self
            .build_payload(
                MessageKind::Update,
                event,
                scope,
                update.message.as_deref(),
                Some(changes),
                None,
            )
            .await;
        payload.event.status = update.status;
        self.enqueue(event.id, &recipients, payload).await
    }

    async fn try_closed(
        &self,
        event: &Event,
        scope: &EventScope,
        resolution: &Resolution,
        kind: MessageKind,
    ) -> Result<usize, RepositoryError> {
        let recipients = self.repo.get_event_subscribers(event.id).await?;
        if recipients.is_empty() {
            return Ok(0);
        }

        let payload = self
            .build_payload(kind, event, scope, None, None, Some(resolution))
            .await;
        self.enqueue(event.id, &recipients, payload).await
    }

    async fn try_cancelled(
        &self,
        event: &Event,
        scope: &EventScope,
    ) -> Result<usize, RepositoryError> {
        let recipients = self.repo.get_event_subscribers(event.id).await?;
        if recipients.is_empty() {
            return Ok(0);
        }

        let payload = self
            .build_payload(MessageKind::Cancelled, event, scope, None, None, None)
            .await;
        self.enqueue(event.id, &recipients, payload).await
    }

    async fn enqueue(
        &self,
        event_id: Uuid,
        channel_ids: &[Uuid],
        payload: NotificationPayload,
    ) -> Result<usize, RepositoryError> {
        let kind = payload.kind;
        let items: Vec<NewQueueItem> = channel_ids
            .iter()
            .map(|&channel_id| {
                NewQueueItem::new(event_id, channel_id, payload.clone(), self.max_attempts)
            })
            .collect();

        let count = self.repo.enqueue_batch(items).await?;
        tracing::info!(event_id = %event_id, kind = %kind, count, "Notifications enqueued");
        Ok(count)
    }

    async fn build_payload(
        &self,
        kind: MessageKind,
        event: &Event,
        scope: &EventScope,
        message: Option<&str>,
        changes: Option<&ChangeSet>,
        resolution: Option<&Resolution>,
    ) -> NotificationPayload {
        let mut services = Vec::with_capacity(scope.services.len());
        for affected in &scope.services {
            services.push(self.service_snapshot(affected).await);
        }

        let mut groups = Vec::with_capacity(scope.group_ids.len());
        for &id in &scope.group_ids {
            groups.push(GroupSnapshot {
                id,
                name: self.group_name(id).await,
            });
        }

        let changes = match changes {
            Some(changes) => Some(self.payload_changes(changes).await),
            None => None,
        };

        let resolution = resolution.map(|r| ResolutionInfo {
            resolved_at: r.resolved_at,
            duration_seconds: resolution_duration(event.started_at, r.resolved_at),
            message: r.message.clone(),
        });

        NotificationPayload {
            kind,
            event: EventSnapshot {
                id: event.id,
                title: event.title.clone(),
                event_type: event.event_type,
                status: event.status,
                severity: event.severity,
                message: message.unwrap_or(&event.description).to_string(),
                services,
                groups,
                started_at: event.started_at,
                scheduled_start_at: event.scheduled_start_at,
                scheduled_end_at: event.scheduled_end_at,
                created_at: event.created_at,
            },
            changes,
            resolution,
            event_url: self.event_url(event.id),
            generated_at: Utc::now(),
        }
    }

    async fn payload_changes(&self, changes: &ChangeSet) -> PayloadChanges {
        let mut services_added = Vec::with_capacity(changes.services_added.len());
        for affected in &changes.services_added {
            services_added.push(self.service_snapshot(affected).await);
        }

        let mut services_removed = Vec::with_capacity(changes.services_removed.len());
        for &id in &changes.services_removed {
            let (name, status) = self.lookup_service(id).await;
            services_removed.push(ServiceSnapshot { id, name, status });
        }

        let mut services_updated = Vec::with_capacity(changes.services_updated.len());
        for change in &changes.services_updated {
            let (name, _) = self.lookup_service(change.service_id).await;
            services_updated.push(ServiceTransition {
                id: change.service_id,
                name,
                from: change.from,
                to: change.to,
            });
        }

        PayloadChanges {
            status: changes.status.map(|s| StatusTransition {
                from: s.from,
                to: s.to,
            }),
            services_added,
            services_removed,
            services_updated,
            reason: changes.reason.clone(),
        }
    }

    async fn service_snapshot(&self, affected: &AffectedService) -> ServiceSnapshot {
        let (name, _) = self.lookup_service(affected.service_id).await;
        ServiceSnapshot {
            id: affected.service_id,
            name,
            status: affected.status,
        }
    }

    /// Best-effort name and current status; falls back to the raw id.
    async fn lookup_service(&self, id: Uuid) -> (String, ServiceStatus) {
        match self.repo.get_service(id).await {
            Ok(Some(service)) => (service.name, service.status),
            Ok(None) => (id.to_string(), ServiceStatus::Unknown),
            Err(e) => {
                tracing::warn!(service_id = %id, error = %e, "Service lookup failed");
                (id.to_string(), ServiceStatus::Unknown)
            }
        }
    }

    async fn group_name(&self, id: Uuid) -> String {
        match self.repo.get_group(id).await {
            Ok(Some(group)) => group.name,
            Ok(None) => id.to_string(),
            Err(e) => {
                tracing::warn!(group_id = %id, error = %e, "Group lookup failed");
                id.to_string()
            }
        }
    }

    fn event_url(&self, event_id: Uuid) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{}/events/{}", base, event_id))
    }
}

fn log_failure(event_id: Uuid, kind: MessageKind, error: &RepositoryError) -> usize {
    tracing::error!(
        event_id = %event_id,
        kind = %kind,
        error = %error,
        "Failed to enqueue notifications"
    );
    0
}
