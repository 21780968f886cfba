//! Asynchronous multi-channel notification delivery.
//!
//! Domain events enter through [`Notifier`], which resolves subscribers,
//! snapshots a [`NotificationPayload`] and enqueues one [`QueueItem`] per
//! channel. A [`WorkerPool`] drains the queue: each item is rendered for its
//! channel type, handed to the matching [`Sender`], and moved to `sent`,
//! back to `pending` with exponential backoff, or to `failed`.
//!
//! The [`Dispatcher`] is the separate synchronous path used for verification
//! and test messages; it never touches the queue and never retries.

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod payload;
pub mod queue;
pub mod render;
pub mod repository;
pub mod sender;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use error::{NotifierError, RenderError, RepositoryError, SendError};
pub use metrics::{DeliveryOutcome, NotificationMetrics};
pub use notifier::Notifier;
pub use payload::{MessageKind, NotificationPayload};
pub use queue::{NewQueueItem, QueueItem, QueueStats, QueueStatus};
pub use render::{RenderedMessage, Renderer};
pub use repository::NotificationRepository;
pub use repository::memory::InMemoryNotificationRepository;
pub use repository::postgres::PgNotificationRepository;
pub use sender::{EmailSender, Notification, Sender, TelegramSender, WebhookSender};
pub use worker::{Worker, WorkerConfig, WorkerPool, refresh_queue_depth};
