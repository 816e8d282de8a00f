//! The storage contract consumed by the notification subsystem.

use std::time::Duration;

use async_trait::async_trait;
use boardwatch_core::{
    Block, BlockKind, BoardMember, Millis, NotificationHint, Subscriber, Subscription, User,
};

use crate::error::StoreError;

/// How many parent links to follow when looking for a block's card.
const MAX_ANCESTOR_DEPTH: usize = 4;

/// Filters for block history queries.
///
/// History rows are selected and ordered by their *insertion* time, never
/// by the block's own `update_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHistoryOptions {
    /// Only rows inserted strictly after this time.
    pub after_insert_at: Option<Millis>,
    /// Only rows inserted strictly before this time.
    pub before_insert_at: Option<Millis>,
    /// Maximum number of rows returned.
    pub limit: Option<u64>,
    /// Newest first when `true`, oldest first otherwise.
    pub descending: bool,
}

impl BlockHistoryOptions {
    /// Rows inserted after `cutoff`, oldest first.
    pub fn after(cutoff: Millis) -> Self {
        Self {
            after_insert_at: Some(cutoff),
            ..Self::default()
        }
    }

    /// The single most recent row.
    pub fn latest() -> Self {
        Self {
            limit: Some(1),
            descending: true,
            ..Self::default()
        }
    }

    /// The single most recent row inserted at or before `at`.
    pub fn latest_through(at: Millis) -> Self {
        Self {
            before_insert_at: Some(at.saturating_add(1)),
            ..Self::latest()
        }
    }
}

/// Storage operations the notification core depends on.
///
/// Implementations must be safe for concurrent use; callers add no locking
/// of their own.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the live row of a block.
    async fn get_block(&self, block_id: &str) -> Result<Block, StoreError>;

    /// Fetch history rows of a single block.
    async fn get_block_history(
        &self,
        block_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<Block>, StoreError>;

    /// Fetch history rows of a block and its direct children.
    async fn get_sub_tree2_from_history(
        &self,
        root_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<Block>, StoreError>;

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, StoreError>;

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError>;

    async fn get_member_for_board(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> Result<BoardMember, StoreError>;

    async fn save_member(&self, member: &BoardMember) -> Result<BoardMember, StoreError>;

    /// Create a subscription, or re-activate the existing one for the same
    /// `(block_id, subscriber_id)`.
    async fn create_subscription(&self, sub: &Subscription) -> Result<Subscription, StoreError>;

    /// Active subscribers of a block, ordered by `notified_at` ascending.
    async fn get_subscribers_for_block(&self, block_id: &str)
        -> Result<Vec<Subscriber>, StoreError>;

    async fn get_subscribers_count_for_block(&self, block_id: &str) -> Result<i64, StoreError>;

    /// Stamp every active subscriber of a block as notified at `notified_at`.
    async fn update_subscribers_notified_at(
        &self,
        block_id: &str,
        notified_at: Millis,
    ) -> Result<(), StoreError>;

    /// Stamp one subscriber of a block as notified at `notified_at`.
    async fn update_subscriber_notified_at(
        &self,
        block_id: &str,
        subscriber_id: &str,
        notified_at: Millis,
    ) -> Result<(), StoreError>;

    /// Insert a hint, or update the existing live hint for the same block.
    ///
    /// `notify_at` becomes `hint.update_at + notify_freq`; an existing row
    /// keeps its `create_at`.
    async fn upsert_notification_hint(
        &self,
        hint: &NotificationHint,
        notify_freq: Duration,
    ) -> Result<NotificationHint, StoreError>;

    /// The hint with the earliest `notify_at`, optionally removing it.
    ///
    /// Returns [`StoreError::NotFound`] when no hints are pending.
    async fn get_next_notification_hint(
        &self,
        remove: bool,
    ) -> Result<NotificationHint, StoreError>;

    /// Fetch a block, falling back to its latest history row so that deleted
    /// blocks still resolve.
    async fn get_block_or_latest(&self, block_id: &str) -> Result<Block, StoreError> {
        match self.get_block(block_id).await {
            Err(e) if e.is_not_found() => self
                .get_block_history(block_id, &BlockHistoryOptions::latest())
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::not_found("block", block_id)),
            other => other,
        }
    }

    /// The version of a block as it stood at `at`: its newest history row
    /// inserted at or before that time.
    async fn get_block_version_at(
        &self,
        block_id: &str,
        at: Millis,
    ) -> Result<Option<Block>, StoreError> {
        Ok(self
            .get_block_history(block_id, &BlockHistoryOptions::latest_through(at))
            .await?
            .into_iter()
            .next())
    }

    /// Resolve the board a block belongs to and, unless the block is a
    /// board, the card it lives under (a card is its own card).
    async fn get_board_and_card(
        &self,
        block: &Block,
    ) -> Result<(Block, Option<Block>), StoreError> {
        if block.kind == BlockKind::Board {
            return Ok((block.clone(), None));
        }

        let board = self.get_block_or_latest(&block.board_id).await?;
        if board.kind != BlockKind::Board {
            return Err(StoreError::not_found("board", block.board_id.clone()));
        }

        let mut current = block.clone();
        for _ in 0..MAX_ANCESTOR_DEPTH {
            if current.kind == BlockKind::Card {
                return Ok((board, Some(current)));
            }
            if current.parent_id.is_empty() || current.parent_id == board.id {
                break;
            }
            current = self.get_block_or_latest(&current.parent_id).await?;
        }

        Ok((board, None))
    }
}
