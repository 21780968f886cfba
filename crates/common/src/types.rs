use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of status-page event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EventType {
    Incident,
    Maintenance,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Incident => write!(f, "incident"),
            EventType::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Lifecycle status of an incident or maintenance window.
///
/// Incidents move through `investigating → identified → monitoring → resolved`,
/// maintenance windows through `scheduled → in_progress → completed | cancelled`.
/// Values this build does not know deserialize as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case", from = "String")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum EventStatus {
    Investigating,
    Identified,
    Monitoring,
    Resolved,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Unknown,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Investigating => "investigating",
            EventStatus::Identified => "identified",
            EventStatus::Monitoring => "monitoring",
            EventStatus::Resolved => "resolved",
            EventStatus::Scheduled => "scheduled",
            EventStatus::InProgress => "in_progress",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for EventStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "investigating" => EventStatus::Investigating,
            "identified" => EventStatus::Identified,
            "monitoring" => EventStatus::Monitoring,
            "resolved" => EventStatus::Resolved,
            "scheduled" => EventStatus::Scheduled,
            "in_progress" => EventStatus::InProgress,
            "completed" => EventStatus::Completed,
            "cancelled" => EventStatus::Cancelled,
            _ => EventStatus::Unknown,
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase", from = "String")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
            Severity::Unknown => "unknown",
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.as_str() {
            "minor" => Severity::Minor,
            "major" => Severity::Major,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status of a single service, as shown on the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case", from = "String")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ServiceStatus {
    Operational,
    Degraded,
    PartialOutage,
    MajorOutage,
    Maintenance,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Operational => "operational",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::PartialOutage => "partial_outage",
            ServiceStatus::MajorOutage => "major_outage",
            ServiceStatus::Maintenance => "maintenance",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for ServiceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "operational" => ServiceStatus::Operational,
            "degraded" => ServiceStatus::Degraded,
            "partial_outage" => ServiceStatus::PartialOutage,
            "major_outage" => ServiceStatus::MajorOutage,
            "maintenance" => ServiceStatus::Maintenance,
            _ => ServiceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Telegram,
    Webhook,
}

impl ChannelType {
    /// Every channel type a delivery template must exist for.
    pub const ALL: [ChannelType; 3] = [ChannelType::Email, ChannelType::Telegram, ChannelType::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Telegram => "telegram",
            ChannelType::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incident or maintenance window.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub event_type: EventType,
    pub status: EventStatus,
    pub severity: Option<Severity>,
    pub description: String,
    /// Whether subscribers should be told about this event at all.
    pub notify_subscribers: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_start_at: Option<DateTime<Utc>>,
    pub scheduled_end_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A service affected by an event, with the status the event assigns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedService {
    pub service_id: Uuid,
    pub status: ServiceStatus,
}

/// The services and groups an event touches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventScope {
    pub services: Vec<AffectedService>,
    pub group_ids: Vec<Uuid>,
}

impl EventScope {
    pub fn service_ids(&self) -> Vec<Uuid> {
        self.services.iter().map(|s| s.service_id).collect()
    }
}

/// A timeline entry posted on an event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventUpdate {
    pub id: Uuid,
    pub event_id: Uuid,
    pub status: EventStatus,
    /// Replaces the event description in the outgoing notification when present.
    pub message: Option<String>,
    pub notify_subscribers: bool,
    pub created_at: DateTime<Utc>,
}

/// Transition of the event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: EventStatus,
    pub to: EventStatus,
}

/// Status transition of one service attached to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusChange {
    pub service_id: Uuid,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
}

/// What an update changed on its event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub status: Option<StatusChange>,
    pub services_added: Vec<AffectedService>,
    pub services_removed: Vec<Uuid>,
    pub services_updated: Vec<ServiceStatusChange>,
    pub reason: Option<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.services_added.is_empty()
            && self.services_removed.is_empty()
            && self.services_updated.is_empty()
            && self.reason.is_none()
    }

    pub fn added_service_ids(&self) -> Vec<Uuid> {
        self.services_added.iter().map(|s| s.service_id).collect()
    }
}

/// How an incident was resolved or a maintenance window completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// A catalog service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub status: ServiceStatus,
}

/// A named group of services.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceGroup {
    pub id: Uuid,
    pub name: String,
}

/// A subscriber's configured delivery target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_type: ChannelType,
    /// Email address, Telegram chat id or webhook URL.
    pub target: String,
    pub enabled: bool,
    pub verified: bool,
    pub subscribe_all_services: bool,
    pub service_ids: HashSet<Uuid>,
    /// Account email of the owner, used when an email channel has no target.
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Only enabled and verified channels receive queued notifications.
    pub fn is_deliverable(&self) -> bool {
        self.enabled && self.verified
    }

    /// Whether this channel wants notifications about any of `service_ids`.
    pub fn is_subscribed_to_any(&self, service_ids: &[Uuid]) -> bool {
        self.subscribe_all_services || service_ids.iter().any(|id| self.service_ids.contains(id))
    }

    pub fn recipient(&self) -> String {
        recipient(self.channel_type, &self.target, self.owner_email.as_deref())
    }
}

/// An eligible channel resolved for a set of services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriberChannel {
    pub channel_id: Uuid,
    pub channel_type: ChannelType,
    pub target: String,
    pub user_email: Option<String>,
}

impl SubscriberChannel {
    pub fn recipient(&self) -> String {
        recipient(self.channel_type, &self.target, self.user_email.as_deref())
    }
}

/// Delivery address of a channel. Email channels without their own address
/// go to the owner's account email.
pub fn recipient(channel_type: ChannelType, target: &str, owner_email: Option<&str>) -> String {
    match (channel_type, owner_email) {
        (ChannelType::Email, Some(email)) if target.trim().is_empty() => email.to_string(),
        _ => target.to_string(),
    }
}
