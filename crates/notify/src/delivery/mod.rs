//! Delivery channels for rendered notifications.
//!
//! A [`Delivery`] is the only way a notification leaves this crate. Two
//! implementations ship:
//!
//! - [`log::LogDelivery`]: writes each notification as a structured log
//!   line.
//! - [`webhook::WebhookDelivery`]: POSTs a JSON payload with retry.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use boardwatch_core::{BlockChangeEvent, Millis, Subscriber};
use serde::Serialize;

use crate::render::Attachment;

pub use self::log::LogDelivery;
pub use self::webhook::WebhookDelivery;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Delivery endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// The channel refused the notification.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What kind of notification is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A batch of changes to a board or card.
    Changes,
    /// The recipient was @-mentioned.
    Mention,
}

/// A notification ready to hand to a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNotification {
    pub kind: NotificationKind,
    /// Who receives it.
    pub subscriber: Subscriber,
    pub workspace_id: String,
    pub board_id: String,
    pub block_id: String,
    /// Display name of the user who made the change.
    pub author: String,
    /// One attachment per changed card.
    pub attachments: Vec<Attachment>,
    /// Flattened markdown of the whole notification.
    pub text: String,
    pub created_at: Millis,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A channel that carries rendered notifications to their recipients.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Hand one notification to the channel.
    async fn deliver(
        &self,
        event: &BlockChangeEvent,
        rendered: &RenderedNotification,
    ) -> Result<(), DeliveryError>;
}
