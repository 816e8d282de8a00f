//! PostgreSQL-backed [`Store`].

use std::time::Duration;

use async_trait::async_trait;
use boardwatch_core::types::duration_millis;
use boardwatch_core::{
    Block, BoardMember, Millis, NotificationHint, Subscriber, Subscription, User,
};

use crate::error::StoreError;
use crate::repositories::{BlockRepo, NotificationHintRepo, SubscriptionRepo, UserRepo};
use crate::store::{BlockHistoryOptions, Store};
use crate::DbPool;

/// [`Store`] implementation over a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_block(&self, block_id: &str) -> Result<Block, StoreError> {
        BlockRepo::find_by_id(&self.pool, block_id)
            .await?
            .map(Block::from)
            .ok_or_else(|| StoreError::not_found("block", block_id))
    }

    async fn get_block_history(
        &self,
        block_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<Block>, StoreError> {
        let rows = BlockRepo::history(&self.pool, block_id, opts).await?;
        Ok(rows.into_iter().map(Block::from).collect())
    }

    async fn get_sub_tree2_from_history(
        &self,
        root_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<Block>, StoreError> {
        let rows = BlockRepo::sub_tree_history(&self.pool, root_id, opts).await?;
        Ok(rows.into_iter().map(Block::from).collect())
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, StoreError> {
        UserRepo::find_by_id(&self.pool, user_id)
            .await?
            .map(User::from)
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        UserRepo::find_by_username(&self.pool, username)
            .await?
            .map(User::from)
            .ok_or_else(|| StoreError::not_found("user", username))
    }

    async fn get_member_for_board(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> Result<BoardMember, StoreError> {
        UserRepo::find_member(&self.pool, board_id, user_id)
            .await?
            .map(BoardMember::from)
            .ok_or_else(|| StoreError::not_found("board member", format!("{board_id}/{user_id}")))
    }

    async fn save_member(&self, member: &BoardMember) -> Result<BoardMember, StoreError> {
        let row = UserRepo::save_member(&self.pool, member).await?;
        Ok(row.into())
    }

    async fn create_subscription(&self, sub: &Subscription) -> Result<Subscription, StoreError> {
        let row = SubscriptionRepo::create(&self.pool, sub).await?;
        Ok(row.into())
    }

    async fn get_subscribers_for_block(
        &self,
        block_id: &str,
    ) -> Result<Vec<Subscriber>, StoreError> {
        let rows = SubscriptionRepo::list_subscribers(&self.pool, block_id).await?;
        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    async fn get_subscribers_count_for_block(&self, block_id: &str) -> Result<i64, StoreError> {
        Ok(SubscriptionRepo::count_subscribers(&self.pool, block_id).await?)
    }

    async fn update_subscribers_notified_at(
        &self,
        block_id: &str,
        notified_at: Millis,
    ) -> Result<(), StoreError> {
        let updated = SubscriptionRepo::mark_notified(&self.pool, block_id, notified_at).await?;
        tracing::debug!(block_id, updated, "Subscribers marked notified");
        Ok(())
    }

    async fn update_subscriber_notified_at(
        &self,
        block_id: &str,
        subscriber_id: &str,
        notified_at: Millis,
    ) -> Result<(), StoreError> {
        SubscriptionRepo::mark_subscriber_notified(&self.pool, block_id, subscriber_id, notified_at)
            .await?;
        Ok(())
    }

    async fn upsert_notification_hint(
        &self,
        hint: &NotificationHint,
        notify_freq: Duration,
    ) -> Result<NotificationHint, StoreError> {
        hint.check()?;
        let notify_at = hint.update_at.saturating_add(duration_millis(notify_freq));
        let row = NotificationHintRepo::upsert(&self.pool, hint, notify_at).await?;
        Ok(row.into())
    }

    async fn get_next_notification_hint(
        &self,
        remove: bool,
    ) -> Result<NotificationHint, StoreError> {
        let row = if remove {
            NotificationHintRepo::take_next(&self.pool).await?
        } else {
            NotificationHintRepo::peek_next(&self.pool).await?
        };
        row.map(NotificationHint::from)
            .ok_or_else(|| StoreError::not_found("notification hint", "next"))
    }
}
