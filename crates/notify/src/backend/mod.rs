//! Pluggable notification backends.
//!
//! Every backend sees every [`BlockChangeEvent`]. Three ship:
//!
//! - [`SubscriptionBackend`]: records hints for subscribed blocks and runs
//!   the scheduled batch notifications.
//! - [`MentionsBackend`]: notifies users newly `@mentioned` in text and
//!   comments.
//! - [`LoggerBackend`]: one log line per change.

mod logger;
mod mentions;
mod subscriptions;

use async_trait::async_trait;
use boardwatch_core::{BlockChangeEvent, User};

use crate::error::NotifyError;

pub use logger::LoggerBackend;
pub use mentions::{extract_mentions, MentionsBackend};
pub use subscriptions::SubscriptionBackend;

/// A consumer of block change events.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), NotifyError>;

    async fn shutdown(&self) -> Result<(), NotifyError>;

    async fn block_changed(&self, event: &BlockChangeEvent) -> Result<(), NotifyError>;
}

/// Told when a user is newly mentioned.
#[async_trait]
pub trait MentionListener: Send + Sync {
    fn name(&self) -> &str;

    async fn on_mention(&self, user: &User, event: &BlockChangeEvent) -> Result<(), NotifyError>;
}
