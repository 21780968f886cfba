//! Channel-agnostic description of what happened.
//!
//! A payload is built once per notification-worthy transition and stored
//! verbatim on every queue item of that transition. Workers render it as-is,
//! so nothing here may depend on state that can change after enqueue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beacon_common::types::{EventStatus, EventType, ServiceStatus, Severity};

/// Which lifecycle transition a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MessageKind {
    Initial,
    Update,
    Resolved,
    Completed,
    Cancelled,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Initial,
        MessageKind::Update,
        MessageKind::Resolved,
        MessageKind::Completed,
        MessageKind::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Initial => "initial",
            MessageKind::Update => "update",
            MessageKind::Resolved => "resolved",
            MessageKind::Completed => "completed",
            MessageKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service as it appears in a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub id: Uuid,
    /// Display name, or the raw id when the name could not be looked up.
    pub name: String,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub id: Uuid,
    pub name: String,
}

/// The event at the moment the notification was generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: Uuid,
    pub title: String,
    pub event_type: EventType,
    pub status: EventStatus,
    pub severity: Option<Severity>,
    /// Event description, or the text of the update being announced.
    pub message: String,
    pub services: Vec<ServiceSnapshot>,
    #[serde(default)]
    pub groups: Vec<GroupSnapshot>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_start_at: Option<DateTime<Utc>>,
    pub scheduled_end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: EventStatus,
    pub to: EventStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTransition {
    pub id: Uuid,
    pub name: String,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
}

/// What an update changed, with display names already resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadChanges {
    pub status: Option<StatusTransition>,
    #[serde(default)]
    pub services_added: Vec<ServiceSnapshot>,
    #[serde(default)]
    pub services_removed: Vec<ServiceSnapshot>,
    #[serde(default)]
    pub services_updated: Vec<ServiceTransition>,
    pub reason: Option<String>,
}

impl PayloadChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.services_added.is_empty()
            && self.services_removed.is_empty()
            && self.services_updated.is_empty()
            && self.reason.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionInfo {
    pub resolved_at: DateTime<Utc>,
    /// Time between the event start and its resolution; zero when the start is unknown.
    pub duration_seconds: i64,
    pub message: Option<String>,
}

/// Immutable notification snapshot stored on every queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub kind: MessageKind,
    pub event: EventSnapshot,
    pub changes: Option<PayloadChanges>,
    pub resolution: Option<ResolutionInfo>,
    pub event_url: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Seconds between `started_at` and `resolved_at`, clamped at zero.
pub fn resolution_duration(
    started_at: Option<DateTime<Utc>>,
    resolved_at: DateTime<Utc>,
) -> i64 {
    started_at
        .map(|start| (resolved_at - start).num_seconds().max(0))
        .unwrap_or(0)
}

/// Human-readable duration such as `2h 5m` or `45s`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if parts.is_empty() {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}
