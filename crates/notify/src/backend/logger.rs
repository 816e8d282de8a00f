use async_trait::async_trait;
use boardwatch_core::BlockChangeEvent;

use super::Backend;
use crate::error::NotifyError;

/// Logs every block change at `info` level.
#[derive(Debug, Default)]
pub struct LoggerBackend;

impl LoggerBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for LoggerBackend {
    fn name(&self) -> &str {
        "logger"
    }

    async fn start(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn block_changed(&self, event: &BlockChangeEvent) -> Result<(), NotifyError> {
        let block = &event.block_changed;
        tracing::info!(
            action = event.action.as_str(),
            block_id = %block.id,
            block_type = %block.kind,
            board_id = event.board.as_ref().map(|b| b.id.as_str()).unwrap_or(""),
            card_id = event.card.as_ref().map(|c| c.id.as_str()).unwrap_or(""),
            modified_by = %event.modified_by_id,
            "Block changed"
        );
        Ok(())
    }
}
