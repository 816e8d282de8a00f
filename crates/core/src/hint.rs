//! Notification hints.
//!
//! A [`NotificationHint`] records that a block has changes subscribers have
//! not been told about yet. The store keeps at most one live hint per block;
//! upserting a hint for a block that already has one moves its schedule
//! instead of adding a second row.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::block::BlockKind;
use crate::error::CoreError;
use crate::types::Millis;

/// Pending-change marker for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHint {
    #[validate(custom(function = "validate_block_type"))]
    pub block_type: BlockKind,
    #[validate(length(min = 1, message = "block id must not be empty"))]
    pub block_id: String,
    #[validate(length(min = 1, message = "workspace id must not be empty"))]
    pub workspace_id: String,
    /// Id of the user who made the most recent change.
    #[validate(length(min = 1, message = "modifier id must not be empty"))]
    pub modified_by_id: String,
    /// Display name of the modifier, when known at hint time.
    #[serde(default)]
    pub username: String,
    pub create_at: Millis,
    /// Time of the most recent change covered by this hint.
    pub update_at: Millis,
    /// When the notifier should process this hint.
    pub notify_at: Millis,
}

impl NotificationHint {
    /// Build a fresh hint for a change made at `now`.
    ///
    /// `notify_at` is left at `now`; the store computes the real schedule on
    /// upsert.
    pub fn new(
        block_type: BlockKind,
        block_id: impl Into<String>,
        workspace_id: impl Into<String>,
        modified_by_id: impl Into<String>,
        now: Millis,
    ) -> Self {
        Self {
            block_type,
            block_id: block_id.into(),
            workspace_id: workspace_id.into(),
            modified_by_id: modified_by_id.into(),
            username: String::new(),
            create_at: now,
            update_at: now,
            notify_at: now,
        }
    }

    /// Check the non-empty invariants before the hint is persisted.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate().map_err(CoreError::from)
    }
}

fn validate_block_type(kind: &BlockKind) -> Result<(), ValidationError> {
    if kind.as_str().is_empty() {
        return Err(ValidationError::new("empty_block_type"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
