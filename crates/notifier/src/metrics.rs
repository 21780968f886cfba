//! Prometheus metrics for the delivery pipeline.
//!
//! Every processed queue item increments exactly one outcome counter, so
//! `queue_items_fetched_total` equals the sum over
//! `notifications_total{channel_type, outcome}` at any quiescent point.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::queue::QueueStatus;

/// Label used when the channel of a queue item no longer exists.
pub const UNKNOWN_CHANNEL_TYPE: &str = "unknown";

/// Terminal result of processing one claimed queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    Success,
    Retry,
    Failed,
    MaxAttempts,
    SkippedUnverified,
    SkippedDisabled,
    ChannelNotFound,
    RenderFailed,
    NoSender,
}

impl DeliveryOutcome {
    pub const ALL: [DeliveryOutcome; 9] = [
        DeliveryOutcome::Success,
        DeliveryOutcome::Retry,
        DeliveryOutcome::Failed,
        DeliveryOutcome::MaxAttempts,
        DeliveryOutcome::SkippedUnverified,
        DeliveryOutcome::SkippedDisabled,
        DeliveryOutcome::ChannelNotFound,
        DeliveryOutcome::RenderFailed,
        DeliveryOutcome::NoSender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Retry => "retry",
            DeliveryOutcome::Failed => "failed",
            DeliveryOutcome::MaxAttempts => "max_attempts",
            DeliveryOutcome::SkippedUnverified => "skipped_unverified",
            DeliveryOutcome::SkippedDisabled => "skipped_disabled",
            DeliveryOutcome::ChannelNotFound => "channel_not_found",
            DeliveryOutcome::RenderFailed => "render_failed",
            DeliveryOutcome::NoSender => "no_sender",
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics collector injected into the worker pool and the HTTP layer.
pub struct NotificationMetrics {
    registry: Registry,
    queue_depth: IntGaugeVec,
    notifications: IntCounterVec,
    send_duration: HistogramVec,
    items_fetched: IntCounter,
}

impl NotificationMetrics {
    /// Create a collector backed by its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create a collector and register its metrics in `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let queue_depth = IntGaugeVec::new(
            Opts::new(
                "beacon_notification_queue_depth",
                "Number of notification queue items by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let notifications = IntCounterVec::new(
            Opts::new(
                "beacon_notifications_total",
                "Processed notification queue items by channel type and outcome",
            ),
            &["channel_type", "outcome"],
        )?;
        registry.register(Box::new(notifications.clone()))?;

        let send_duration = HistogramVec::new(
            HistogramOpts::new(
                "beacon_notification_send_duration_seconds",
                "Time spent in the channel sender per delivery attempt",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["channel_type"],
        )?;
        registry.register(Box::new(send_duration.clone()))?;

        let items_fetched = IntCounter::new(
            "beacon_notification_queue_items_fetched_total",
            "Queue items claimed by workers",
        )?;
        registry.register(Box::new(items_fetched.clone()))?;

        Ok(Self {
            registry,
            queue_depth,
            notifications,
            send_duration,
            items_fetched,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_fetched(&self, count: usize) {
        self.items_fetched.inc_by(count as u64);
    }

    pub fn record_outcome(&self, channel_type: &str, outcome: DeliveryOutcome) {
        self.notifications
            .with_label_values(&[channel_type, outcome.as_str()])
            .inc();
    }

    pub fn observe_send_duration(&self, channel_type: &str, seconds: f64) {
        self.send_duration
            .with_label_values(&[channel_type])
            .observe(seconds);
    }

    pub fn set_queue_depth(&self, status: QueueStatus, depth: i64) {
        self.queue_depth
            .with_label_values(&[status.as_str()])
            .set(depth);
    }

    pub fn fetched_count(&self) -> u64 {
        self.items_fetched.get()
    }

    pub fn outcome_count(&self, channel_type: &str, outcome: DeliveryOutcome) -> u64 {
        self.notifications
            .with_label_values(&[channel_type, outcome.as_str()])
            .get()
    }

    /// Sum over every outcome counter; matches `fetched_count` once all claimed items are processed.
    pub fn total_outcomes(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "beacon_notifications_total")
            .flat_map(|family| family.get_metric().iter())
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }

    pub fn queue_depth(&self, status: QueueStatus) -> i64 {
        self.queue_depth.with_label_values(&[status.as_str()]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
