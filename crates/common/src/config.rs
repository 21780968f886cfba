use std::str::FromStr;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the HTTP API listens on (default: 3000)
    pub api_port: u16,

    /// Public base URL of the status page, used for deep links in notifications
    pub public_url: Option<String>,

    /// Whether this process runs the delivery worker pool (default: true)
    pub worker_enabled: bool,

    /// Number of concurrent queue pollers (default: 3)
    pub worker_count: usize,

    /// Poll interval of each queue poller in milliseconds (default: 1000)
    pub worker_poll_interval_ms: u64,

    /// Maximum number of queue items claimed per poll (default: 10)
    pub worker_batch_size: u32,

    /// Items stuck in `processing` longer than this are returned to `pending` on startup (default: 600)
    pub worker_stale_claim_secs: u64,

    /// Delivery attempts before an item is marked failed (default: 5)
    pub notify_max_attempts: i32,

    /// First retry delay in milliseconds (default: 1000)
    pub notify_initial_backoff_ms: u64,

    /// Growth factor applied to the retry delay per attempt (default: 2.0)
    pub notify_backoff_multiplier: f64,

    /// Upper bound of the retry delay in milliseconds (default: 300000 = 5 min)
    pub notify_max_backoff_ms: u64,

    /// How often the queue depth gauge is refreshed, in seconds (default: 15)
    pub queue_stats_interval_secs: u64,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Per-request timeout of outbound senders in seconds (default: 10)
    pub sender_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            db_max_connections: 20,
            api_port: 3000,
            public_url: None,
            worker_enabled: true,
            worker_count: 3,
            worker_poll_interval_ms: 1000,
            worker_batch_size: 10,
            worker_stale_claim_secs: 600,
            notify_max_attempts: 5,
            notify_initial_backoff_ms: 1000,
            notify_backoff_multiplier: 2.0,
            notify_max_backoff_ms: 300_000,
            queue_stats_interval_secs: 15,
            telegram_bot_token: None,
            resend_api_key: None,
            email_from: None,
            sender_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            api_port: env_or("API_PORT", defaults.api_port)?,
            public_url: std::env::var("PUBLIC_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            worker_enabled: env_or("WORKER_ENABLED", defaults.worker_enabled)?,
            worker_count: env_or("WORKER_COUNT", defaults.worker_count)?,
            worker_poll_interval_ms: env_or(
                "WORKER_POLL_INTERVAL_MS",
                defaults.worker_poll_interval_ms,
            )?,
            worker_batch_size: env_or("WORKER_BATCH_SIZE", defaults.worker_batch_size)?,
            worker_stale_claim_secs: env_or(
                "WORKER_STALE_CLAIM_SECS",
                defaults.worker_stale_claim_secs,
            )?,
            notify_max_attempts: env_or("NOTIFY_MAX_ATTEMPTS", defaults.notify_max_attempts)?,
            notify_initial_backoff_ms: env_or(
                "NOTIFY_INITIAL_BACKOFF_MS",
                defaults.notify_initial_backoff_ms,
            )?,
            notify_backoff_multiplier: env_or(
                "NOTIFY_BACKOFF_MULTIPLIER",
                defaults.notify_backoff_multiplier,
            )?,
            notify_max_backoff_ms: env_or("NOTIFY_MAX_BACKOFF_MS", defaults.notify_max_backoff_ms)?,
            queue_stats_interval_secs: env_or(
                "QUEUE_STATS_INTERVAL_SECS",
                defaults.queue_stats_interval_secs,
            )?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            sender_timeout_secs: env_or("SENDER_TIMEOUT_SECS", defaults.sender_timeout_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break the delivery pipeline.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_enabled && self.worker_count == 0 {
            anyhow::bail!("WORKER_COUNT must be at least 1 when the worker is enabled");
        }
        if self.worker_poll_interval_ms == 0 {
            anyhow::bail!("WORKER_POLL_INTERVAL_MS must be greater than 0");
        }
        if self.worker_batch_size == 0 {
            anyhow::bail!("WORKER_BATCH_SIZE must be greater than 0");
        }
        if self.notify_max_attempts < 1 {
            anyhow::bail!("NOTIFY_MAX_ATTEMPTS must be at least 1");
        }
        if !self.notify_backoff_multiplier.is_finite() || self.notify_backoff_multiplier < 1.0 {
            anyhow::bail!("NOTIFY_BACKOFF_MULTIPLIER must be a finite number >= 1.0");
        }
        if self.notify_initial_backoff_ms > self.notify_max_backoff_ms {
            anyhow::bail!("NOTIFY_INITIAL_BACKOFF_MS must not exceed NOTIFY_MAX_BACKOFF_MS");
        }
        if self.queue_stats_interval_secs == 0 {
            anyhow::bail!("QUEUE_STATS_INTERVAL_SECS must be greater than 0");
        }
        if self.sender_timeout_secs == 0 {
            anyhow::bail!("SENDER_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

/// Read and parse an optional environment variable, falling back to `default` when unset.
fn env_or<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let config = AppConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // A process that does not run workers may leave the count at zero.
        let api_only = AppConfig {
            worker_count: 0,
            worker_enabled: false,
            ..Default::default()
        };
        assert!(api_only.validate().is_ok());
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let config = AppConfig {
            notify_backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_initial_backoff_above_max() {
        let config = AppConfig {
            notify_initial_backoff_ms: 10_000,
            notify_max_backoff_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = AppConfig {
            notify_max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_stats_interval() {
        let config = AppConfig {
            queue_stats_interval_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("QUEUE_STATS_INTERVAL_SECS"));
    }

    #[test]
    fn test_rejects_zero_sender_timeout() {
        let config = AppConfig {
            sender_timeout_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SENDER_TIMEOUT_SECS"));
    }
}
