//! Delivery that writes notifications to the log.

use async_trait::async_trait;
use boardwatch_core::BlockChangeEvent;

use super::{Delivery, DeliveryError, RenderedNotification};

/// Logs every notification at `info` level. Used when no webhook is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl LogDelivery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Delivery for LogDelivery {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(
        &self,
        event: &BlockChangeEvent,
        rendered: &RenderedNotification,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            kind = ?rendered.kind,
            action = event.action.as_str(),
            subscriber_id = %rendered.subscriber.subscriber_id,
            board_id = %rendered.board_id,
            block_id = %rendered.block_id,
            author = %rendered.author,
            attachments = rendered.attachments.len(),
            text = %rendered.text,
            "Notification"
        );
        Ok(())
    }
}
