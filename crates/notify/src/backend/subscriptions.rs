//! Subscription-driven notifications.
//!
//! On each change the backend records a hint for the board, the card and
//! the changed block, for whichever of them has subscribers, and wakes the
//! [`Notifier`]. The notifier later runs the [`Dispatcher`] over the hints
//! that have come due.

use std::sync::Arc;

use async_trait::async_trait;
use boardwatch_core::{
    now_millis, Block, BlockChangeEvent, BlockKind, BoardMember, ChangeAction, NotificationHint,
    NotifyFrequencies, Subscription, User,
};
use boardwatch_db::Store;

use super::{Backend, MentionListener};
use crate::delivery::Delivery;
use crate::dispatcher::Dispatcher;
use crate::error::NotifyError;
use crate::hints::HintStore;
use crate::notifier::Notifier;
use crate::render::AttachmentOptions;

/// Backend that notifies subscribers of blocks.
pub struct SubscriptionBackend {
    store: Arc<dyn Store>,
    hints: HintStore,
    notifier: Notifier,
}

impl SubscriptionBackend {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<dyn Delivery>,
        frequencies: Arc<NotifyFrequencies>,
        attachments: AttachmentOptions,
    ) -> Self {
        let hints = HintStore::new(Arc::clone(&store), Arc::clone(&frequencies));
        let dispatcher = Dispatcher::new(Arc::clone(&store), hints.clone(), delivery, attachments);
        let notifier = Notifier::new(frequencies, Arc::new(dispatcher));
        Self {
            store,
            hints,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Record a hint for `block` if anyone subscribes to it.
    async fn notify_subscribers_of(
        &self,
        block: &Block,
        event: &BlockChangeEvent,
    ) -> Result<(), NotifyError> {
        let count = self
            .store
            .get_subscribers_count_for_block(&block.id)
            .await
            .map_err(|e| NotifyError::store(format!("count subscribers of {}", block.id), e))?;
        if count == 0 {
            return Ok(());
        }

        let hint = NotificationHint::new(
            block.kind.clone(),
            block.id.clone(),
            event.workspace_id.clone(),
            event.modified_by_id.clone(),
            now_millis(),
        );
        let saved = self.hints.upsert(&hint).await?;
        tracing::debug!(
            block_id = %saved.block_id,
            block_type = %saved.block_type,
            subscribers = count,
            notify_at = saved.notify_at,
            "Notification hint recorded"
        );
        self.notifier.on_notification_hint(saved);
        Ok(())
    }

    async fn subscribe_user_to_card(
        &self,
        card: &Block,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<(), NotifyError> {
        let sub = Subscription::for_user(
            BlockKind::Card,
            card.id.clone(),
            workspace_id,
            user_id,
            now_millis(),
        );
        self.store
            .create_subscription(&sub)
            .await
            .map_err(|e| NotifyError::store(format!("subscribe {user_id} to card {}", card.id), e))?;
        tracing::debug!(card_id = %card.id, user_id, "Subscribed user to card");
        Ok(())
    }
}

#[async_trait]
impl Backend for SubscriptionBackend {
    fn name(&self) -> &str {
        "subscriptions"
    }

    async fn start(&self) -> Result<(), NotifyError> {
        self.notifier.start();
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), NotifyError> {
        self.notifier.stop().await;
        Ok(())
    }

    async fn block_changed(&self, event: &BlockChangeEvent) -> Result<(), NotifyError> {
        let Some(board) = event.board.as_ref() else {
            tracing::debug!(block_id = %event.block_changed.id, "Change has no board, ignoring");
            return Ok(());
        };

        let changed = &event.block_changed;

        if event.action == ChangeAction::Add && changed.kind == BlockKind::Card {
            self.subscribe_user_to_card(changed, &event.workspace_id, &event.modified_by_id)
                .await?;
        }

        let mut targets: Vec<&Block> = vec![board];
        if let Some(card) = event.card.as_ref() {
            targets.push(card);
        }
        if changed.kind != BlockKind::Board && changed.kind != BlockKind::Card {
            targets.push(changed);
        }

        let mut failures = Vec::new();
        for block in targets {
            if let Err(e) = self.notify_subscribers_of(block, event).await {
                failures.push(e);
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(NotifyError::Multiple(failures)),
        }
    }
}

#[async_trait]
impl MentionListener for SubscriptionBackend {
    fn name(&self) -> &str {
        "subscriptions"
    }

    /// Make sure the mentioned user can see the board, then subscribe them
    /// to the card.
    async fn on_mention(&self, user: &User, event: &BlockChangeEvent) -> Result<(), NotifyError> {
        let (Some(board), Some(card)) = (event.board.as_ref(), event.card.as_ref()) else {
            return Ok(());
        };

        match self.store.get_member_for_board(&board.id, &user.id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                self.store
                    .save_member(&BoardMember::commenter(board.id.clone(), user.id.clone()))
                    .await
                    .map_err(|e| {
                        NotifyError::store(format!("add {} to board {}", user.id, board.id), e)
                    })?;
                tracing::info!(board_id = %board.id, user_id = %user.id, "Added mentioned user to board");
            }
            Err(e) => {
                return Err(NotifyError::store(
                    format!("get membership of {} in {}", user.id, board.id),
                    e,
                ))
            }
        }

        self.subscribe_user_to_card(card, &event.workspace_id, &user.id)
            .await
    }
}
