//! Queue workers.
//!
//! Each worker claims a batch of due items per tick and drives every item to
//! exactly one [`DeliveryOutcome`]:
//!
//! ```text
//! pending ──claim──▶ processing ──▶ sent
//!                        │
//!                        ├──▶ pending (retryable, attempts + 1, backoff)
//!                        └──▶ failed  (permanent, gated, or out of attempts)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use beacon_common::config::AppConfig;

use crate::backoff::BackoffPolicy;
use crate::dispatcher::Dispatcher;
use crate::error::{NotifierError, SendError};
use crate::metrics::{DeliveryOutcome, NotificationMetrics, UNKNOWN_CHANNEL_TYPE};
use crate::queue::{QueueItem, QueueStatus};
use crate::render::Renderer;
use crate::repository::NotificationRepository;
use crate::sender::Notification;

/// `tokio::time::interval` rejects a zero period.
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub backoff: BackoffPolicy,
    /// Claims older than this are considered abandoned on startup.
    pub stale_claim_after: Duration,
    pub stats_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            poll_interval: Duration::from_millis(1000),
            batch_size: 10,
            backoff: BackoffPolicy::default(),
            stale_claim_after: Duration::from_secs(600),
            stats_interval: Duration::from_secs(15),
        }
    }
}

impl From<&AppConfig> for WorkerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
            batch_size: config.worker_batch_size,
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.notify_initial_backoff_ms),
                config.notify_backoff_multiplier,
                Duration::from_millis(config.notify_max_backoff_ms),
            ),
            stale_claim_after: Duration::from_secs(config.worker_stale_claim_secs),
            stats_interval: Duration::from_secs(config.queue_stats_interval_secs),
        }
    }
}

/// A single queue consumer. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Worker {
    id: usize,
    repo: Arc<dyn NotificationRepository>,
    renderer: Arc<Renderer>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<NotificationMetrics>,
    backoff: BackoffPolicy,
    batch_size: u32,
}

impl Worker {
    pub fn new(
        id: usize,
        repo: Arc<dyn NotificationRepository>,
        renderer: Arc<Renderer>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<NotificationMetrics>,
        backoff: BackoffPolicy,
        batch_size: u32,
    ) -> Self {
        Self {
            id,
            repo,
            renderer,
            dispatcher,
            metrics,
            backoff,
            batch_size,
        }
    }

    /// Claim and process one batch. Returns the number of items processed.
    pub async fn process_batch(&self) -> Result<usize, NotifierError> {
        let items = self.repo.claim_due(self.batch_size).await?;
        if items.is_empty() {
            return Ok(0);
        }

        self.metrics.record_fetched(items.len());
        tracing::debug!(worker = self.id, count = items.len(), "Claimed queue items");

        let count = items.len();
        for item in items {
            self.process_item(&item).await;
        }
        Ok(count)
    }

    /// Drive one claimed item to its next state and record the outcome.
    pub async fn process_item(&self, item: &QueueItem) -> DeliveryOutcome {
        let (channel_type, outcome) = self.deliver(item).await;
        self.metrics.record_outcome(&channel_type, outcome);
        outcome
    }

    async fn deliver(&self, item: &QueueItem) -> (String, DeliveryOutcome) {
        let channel = match self.repo.get_channel(item.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                self.fail(item, "channel not found").await;
                return (UNKNOWN_CHANNEL_TYPE.to_string(), DeliveryOutcome::ChannelNotFound);
            }
            Err(e) => {
                let error = format!("channel lookup failed: {}", e);
                let outcome = self.retry_or_fail(item, &error, None).await;
                return (UNKNOWN_CHANNEL_TYPE.to_string(), outcome);
            }
        };
        let label = channel.channel_type.as_str().to_string();

        if !channel.verified {
            self.fail(item, "channel is not verified").await;
            return (label, DeliveryOutcome::SkippedUnverified);
        }
        if !channel.enabled {
            self.fail(item, "channel is disabled").await;
            return (label, DeliveryOutcome::SkippedDisabled);
        }

        let message = match self.renderer.render(channel.channel_type, &item.payload) {
            Ok(message) => message,
            Err(e) => {
                self.fail(item, &format!("render failed: {}", e)).await;
                return (label, DeliveryOutcome::RenderFailed);
            }
        };

        let Some(sender) = self.dispatcher.sender(channel.channel_type) else {
            self.fail(
                item,
                &format!("no sender configured for {} channels", channel.channel_type),
            )
            .await;
            return (label, DeliveryOutcome::NoSender);
        };

        let notification = Notification {
            to: channel.recipient(),
            subject: message.subject,
            body: message.body,
        };

        let started = Instant::now();
        let result = sender.send(&notification).await;
        self.metrics
            .observe_send_duration(&label, started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(()) => {
                if let Err(e) = self.repo.mark_sent(item.id).await {
                    tracing::error!(item_id = %item.id, error = %e, "Failed to mark item sent");
                }
                tracing::info!(
                    worker = self.id,
                    item_id = %item.id,
                    channel_type = %label,
                    attempt = item.attempts + 1,
                    "Notification delivered"
                );
                DeliveryOutcome::Success
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(
                    item_id = %item.id,
                    channel_type = %label,
                    error = %e,
                    "Permanent delivery failure"
                );
                self.fail(item, &e.to_string()).await;
                DeliveryOutcome::Failed
            }
            Err(e) => {
                let retry_after = match &e {
                    SendError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                self.retry_or_fail(item, &e.to_string(), retry_after).await
            }
        };
        (label, outcome)
    }

    /// Reschedule a retryable failure, or fail the item if this was its last attempt.
    async fn retry_or_fail(
        &self,
        item: &QueueItem,
        error: &str,
        retry_after: Option<Duration>,
    ) -> DeliveryOutcome {
        if item.is_last_attempt() {
            let message = format!("max attempts exceeded ({}): {}", item.max_attempts, error);
            tracing::warn!(item_id = %item.id, attempts = item.attempts + 1, error = %error, "Giving up on notification");
            self.fail(item, &message).await;
            return DeliveryOutcome::MaxAttempts;
        }

        let attempt = (item.attempts + 1).max(1) as u32;
        let mut delay = self.backoff.delay_for(attempt);
        if let Some(retry_after) = retry_after {
            delay = delay.max(retry_after);
        }
        let next_attempt_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

        if let Err(e) = self.repo.mark_for_retry(item.id, error, next_attempt_at).await {
            tracing::error!(item_id = %item.id, error = %e, "Failed to reschedule item");
        }
        tracing::info!(
            item_id = %item.id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Delivery failed, retry scheduled"
        );
        DeliveryOutcome::Retry
    }

    async fn fail(&self, item: &QueueItem, error: &str) {
        if let Err(e) = self.repo.mark_failed(item.id, error).await {
            tracing::error!(item_id = %item.id, error = %e, "Failed to mark item failed");
        }
    }
}

/// Refresh the queue-depth gauge from the repository.
pub async fn refresh_queue_depth(
    repo: &dyn NotificationRepository,
    metrics: &NotificationMetrics,
) -> Result<(), NotifierError> {
    let stats = repo.queue_stats().await?;
    for status in QueueStatus::ALL {
        metrics.set_queue_depth(status, stats.get(status));
    }
    Ok(())
}

/// Fixed set of polling workers plus a queue-depth sampler.
pub struct WorkerPool {
    config: WorkerConfig,
    repo: Arc<dyn NotificationRepository>,
    renderer: Arc<Renderer>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<NotificationMetrics>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        repo: Arc<dyn NotificationRepository>,
        renderer: Arc<Renderer>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<NotificationMetrics>,
    ) -> Self {
        Self {
            config,
            repo,
            renderer,
            dispatcher,
            metrics,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Recover abandoned claims, then spawn the pollers and the sampler.
    pub async fn start(&mut self) -> Result<(), NotifierError> {
        if self.is_running() {
            return Ok(());
        }
        // A token cancelled by an earlier stop() would end new tasks at once.
        self.cancel = CancellationToken::new();

        let stale_after = chrono::Duration::from_std(self.config.stale_claim_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let recovered = self.repo.recover_stale(Utc::now() - stale_after).await?;
        if recovered > 0 {
            tracing::warn!(recovered, "Returned stale claims to the queue");
        }

        for id in 0..self.config.worker_count {
            let worker = Worker::new(
                id,
                self.repo.clone(),
                self.renderer.clone(),
                self.dispatcher.clone(),
                self.metrics.clone(),
                self.config.backoff,
                self.config.batch_size,
            );
            let cancel = self.cancel.clone();
            let interval = self.config.poll_interval;
            self.handles
                .push(tokio::spawn(run_worker(worker, interval, cancel)));
        }

        self.handles.push(tokio::spawn(run_sampler(
            self.repo.clone(),
            self.metrics.clone(),
            self.config.stats_interval,
            self.cancel.clone(),
        )));

        tracing::info!(
            workers = self.config.worker_count,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Notification worker pool started"
        );
        Ok(())
    }

    /// Cancel every task and wait for in-flight batches to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Notification worker pool stopped");
    }
}

async fn run_worker(worker: Worker, poll_interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(poll_interval.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = worker.process_batch().await {
            tracing::error!(worker = worker.id, error = %e, "Queue poll failed");
        }
    }

    tracing::debug!(worker = worker.id, "Worker stopped");
}

async fn run_sampler(
    repo: Arc<dyn NotificationRepository>,
    metrics: Arc<NotificationMetrics>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = refresh_queue_depth(repo.as_ref(), &metrics).await {
            tracing::warn!(error = %e, "Queue depth sampling failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_from_app_config() {
        let app = AppConfig {
            worker_count: 7,
            worker_poll_interval_ms: 250,
            worker_batch_size: 25,
            notify_initial_backoff_ms: 500,
            notify_backoff_multiplier: 3.0,
            notify_max_backoff_ms: 60_000,
            ..AppConfig::default()
        };

        let config = WorkerConfig::from(&app);
        assert_eq!(config.worker_count, 7);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.backoff.delay_for(2), Duration::from_millis(1500));
        assert_eq!(config.backoff.max, Duration::from_secs(60));
    }
}
