//! Notification service configuration loaded from environment variables.

use std::time::Duration;

use boardwatch_core::frequency::{
    DEFAULT_BOARD_FREQUENCY, DEFAULT_CARD_FREQUENCY, DEFAULT_FREQUENCY,
};
use boardwatch_core::NotifyFrequencies;

use crate::pool::{PoolConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::render::templates::DEFAULT_LANGUAGE;

/// Default graceful shutdown deadline in seconds.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default base URL used when building links into the web app.
const DEFAULT_SITE_URL: &str = "http://localhost:8000";

/// Configuration for the notification service.
///
/// All fields have defaults suitable for local development. Malformed
/// numbers fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyConfig {
    /// PostgreSQL URL; `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// Task pool sizing.
    pub pool: PoolConfig,
    /// Delay before a board change is reported (default: 24 h).
    pub board_frequency: Duration,
    /// Delay before a card change is reported (default: 60 s).
    pub card_frequency: Duration,
    /// Delay for every other block kind (default: 60 s).
    pub default_frequency: Duration,
    /// Deadline for graceful shutdown (default: 30 s).
    pub shutdown_timeout: Duration,
    /// Base URL of the web app for card and board links.
    pub site_url: String,
    /// Webhook endpoint; `None` logs notifications instead.
    pub webhook_url: Option<String>,
    /// Template language (default: `en`).
    pub language: String,
}

impl NotifyConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `DATABASE_URL`                 | unset (in-memory store) |
    /// | `NOTIFY_POOL_WORKERS`          | `8`                     |
    /// | `NOTIFY_POOL_QUEUE_CAPACITY`   | `512`                   |
    /// | `NOTIFY_FREQ_BOARD_SECS`       | `86400`                 |
    /// | `NOTIFY_FREQ_CARD_SECS`        | `60`                    |
    /// | `NOTIFY_FREQ_DEFAULT_SECS`     | `60`                    |
    /// | `NOTIFY_SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `NOTIFY_SITE_URL`              | `http://localhost:8000` |
    /// | `NOTIFY_WEBHOOK_URL`           | unset (log delivery)    |
    /// | `NOTIFY_LANGUAGE`              | `en`                    |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| Duration::from_secs(number(key, default.as_secs()));

        Self {
            database_url: non_empty("DATABASE_URL"),
            pool: PoolConfig {
                workers: number("NOTIFY_POOL_WORKERS", DEFAULT_WORKERS as u64) as usize,
                queue_capacity: number("NOTIFY_POOL_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY as u64)
                    as usize,
            },
            board_frequency: secs("NOTIFY_FREQ_BOARD_SECS", DEFAULT_BOARD_FREQUENCY),
            card_frequency: secs("NOTIFY_FREQ_CARD_SECS", DEFAULT_CARD_FREQUENCY),
            default_frequency: secs("NOTIFY_FREQ_DEFAULT_SECS", DEFAULT_FREQUENCY),
            shutdown_timeout: Duration::from_secs(number(
                "NOTIFY_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )),
            site_url: non_empty("NOTIFY_SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            webhook_url: non_empty("NOTIFY_WEBHOOK_URL"),
            language: non_empty("NOTIFY_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }

    /// The frequency table described by this configuration.
    pub fn frequencies(&self) -> NotifyFrequencies {
        NotifyFrequencies::new(
            self.board_frequency,
            self.card_frequency,
            self.default_frequency,
        )
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
