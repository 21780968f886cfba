//! Durable work-queue model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::{MessageKind, NotificationPayload};

/// Lifecycle of a queue item.
///
/// `pending → processing → sent | failed`, with `processing → pending` when a
/// retryable delivery failure is rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 4] = [
        QueueStatus::Pending,
        QueueStatus::Processing,
        QueueStatus::Sent,
        QueueStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "sent" => Ok(QueueStatus::Sent),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status '{}'", other)),
        }
    }
}

/// A unit of delivery work: one payload for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub event_id: Uuid,
    pub channel_id: Uuid,
    pub kind: MessageKind,
    pub payload: NotificationPayload,
    pub status: QueueStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Whether one more failed attempt exhausts the attempt budget.
    pub fn is_last_attempt(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}

/// Insert parameters for a queue item; the store assigns status and timestamps.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub id: Uuid,
    pub event_id: Uuid,
    pub channel_id: Uuid,
    pub kind: MessageKind,
    pub payload: NotificationPayload,
    pub max_attempts: i32,
}

impl NewQueueItem {
    pub fn new(
        event_id: Uuid,
        channel_id: Uuid,
        payload: NotificationPayload,
        max_attempts: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            channel_id,
            kind: payload.kind,
            payload,
            max_attempts,
        }
    }
}

/// Number of queue items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn get(&self, status: QueueStatus) -> i64 {
        match status {
            QueueStatus::Pending => self.pending,
            QueueStatus::Processing => self.processing,
            QueueStatus::Sent => self.sent,
            QueueStatus::Failed => self.failed,
        }
    }

    pub fn add(&mut self, status: QueueStatus, count: i64) {
        match status {
            QueueStatus::Pending => self.pending += count,
            QueueStatus::Processing => self.processing += count,
            QueueStatus::Sent => self.sent += count,
            QueueStatus::Failed => self.failed += count,
        }
    }
}
