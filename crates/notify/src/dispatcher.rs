//! The batch-notify procedure.
//!
//! For each due hint the [`Dispatcher`] loads the block's subscribers,
//! builds the diffs since the oldest of their last notifications, renders
//! what each subscriber has not seen yet and hands it to the [`Delivery`].
//! The change's author is never notified of their own change.
//!
//! Subscribers are stamped as notified only once they have everything the
//! diffs describe. When a delivery fails the failing subscribers keep their
//! old stamp and the hint is put back, so the next pass tries them again.
//!
//! Missing blocks and malformed board schemas skip the hint. Every other
//! failure is collected and the pass carries on.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use boardwatch_core::{
    now_millis, BlockChangeEvent, ChangeAction, Millis, NotificationHint, Subscriber,
};
use boardwatch_db::Store;

use crate::delivery::{Delivery, NotificationKind, RenderedNotification};
use crate::diff::{Diff, DiffGenerator};
use crate::error::NotifyError;
use crate::hints::{HintStore, NextHint};
use crate::notifier::{BatchReport, HintProcessor};
use crate::render::{attachments_to_markdown, diffs_to_attachments, AttachmentOptions};

/// Renders and delivers notifications for due hints.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    hints: HintStore,
    delivery: Arc<dyn Delivery>,
    attachments: AttachmentOptions,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        hints: HintStore,
        delivery: Arc<dyn Delivery>,
        attachments: AttachmentOptions,
    ) -> Self {
        Self {
            store,
            hints,
            delivery,
            attachments,
        }
    }

    /// Notify every subscriber of one hint's block.
    pub async fn notify_hint(&self, hint: &NotificationHint) -> Result<(), NotifyError> {
        let block_id = hint.block_id.as_str();

        let subscribers = self
            .store
            .get_subscribers_for_block(block_id)
            .await
            .map_err(|e| NotifyError::store(format!("get subscribers of {block_id}"), e))?;
        if subscribers.is_empty() {
            tracing::debug!(block_id, "No subscribers, dropping hint");
            return Ok(());
        }

        let last_notify_at = subscribers
            .iter()
            .map(|s| s.notified_at)
            .min()
            .unwrap_or_default();

        let diffs = DiffGenerator::new(Arc::clone(&self.store), hint.clone(), last_notify_at)
            .generate_diffs()
            .await?;

        let mut failures = Vec::new();
        let mut delivered = 0usize;
        // Subscribers who now know everything the diffs describe.
        let mut caught_up: Vec<&str> = Vec::with_capacity(subscribers.len());

        match event_for(hint, &diffs) {
            Some(event) => {
                for subscriber in &subscribers {
                    if subscriber.subscriber_id == hint.modified_by_id {
                        caught_up.push(&subscriber.subscriber_id);
                        continue;
                    }
                    match self.notify_subscriber(&event, subscriber, &diffs).await {
                        Ok(sent) => {
                            delivered += usize::from(sent);
                            caught_up.push(&subscriber.subscriber_id);
                        }
                        Err(e) => {
                            tracing::warn!(
                                block_id,
                                subscriber_id = %subscriber.subscriber_id,
                                error = %e,
                                "Notification delivery failed"
                            );
                            failures.push(e);
                        }
                    }
                }
            }
            None => caught_up.extend(subscribers.iter().map(|s| s.subscriber_id.as_str())),
        }

        let reported_through = diffs
            .iter()
            .map(|d| d.update_at)
            .max()
            .unwrap_or_default()
            .max(hint.update_at);

        if failures.is_empty() {
            self.store
                .update_subscribers_notified_at(block_id, reported_through)
                .await
                .map_err(|e| {
                    NotifyError::store(format!("mark subscribers of {block_id} notified"), e)
                })?;
        } else {
            for subscriber_id in caught_up {
                if let Err(e) = self
                    .store
                    .update_subscriber_notified_at(block_id, subscriber_id, reported_through)
                    .await
                {
                    failures.push(NotifyError::store(
                        format!("mark {subscriber_id} notified of {block_id}"),
                        e,
                    ));
                }
            }
            match self.hints.reschedule(hint, now_millis()).await {
                Ok(retry) => tracing::info!(
                    block_id,
                    failed = failures.len(),
                    notify_at = retry.notify_at,
                    "Hint rescheduled after failed deliveries"
                ),
                Err(e) => failures.push(e),
            }
        }

        tracing::debug!(
            block_id,
            diffs = diffs.len(),
            subscribers = subscribers.len(),
            delivered,
            "Hint processed"
        );

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(NotifyError::Multiple(failures)),
        }
    }

    /// Render and deliver what `subscriber` has not seen. Returns whether
    /// anything was delivered.
    async fn notify_subscriber(
        &self,
        event: &BlockChangeEvent,
        subscriber: &Subscriber,
        diffs: &[Diff],
    ) -> Result<bool, NotifyError> {
        let unseen: Vec<Diff> = diffs
            .iter()
            .filter_map(|d| d.since(subscriber.notified_at))
            .collect();
        let Some(author) = unseen.first().map(|d| d.username.clone()) else {
            return Ok(false);
        };

        let attachments = diffs_to_attachments(&unseen, &self.attachments)?;
        if attachments.is_empty() {
            return Ok(false);
        }

        let text = attachments_to_markdown(&attachments);
        let rendered = RenderedNotification {
            kind: NotificationKind::Changes,
            subscriber: subscriber.clone(),
            workspace_id: event.workspace_id.clone(),
            board_id: event
                .board
                .as_ref()
                .map(|b| b.id.clone())
                .unwrap_or_default(),
            block_id: event.block_changed.id.clone(),
            author,
            attachments,
            text,
            created_at: now_millis(),
        };

        self.delivery
            .deliver(event, &rendered)
            .await
            .map_err(|source| NotifyError::Delivery {
                subscriber_id: subscriber.subscriber_id.clone(),
                source,
            })?;
        Ok(true)
    }
}

/// Describe the batch as a change event for the delivery channel.
fn event_for(hint: &NotificationHint, diffs: &[Diff]) -> Option<BlockChangeEvent> {
    let root = diffs.iter().find(|d| d.block_id() == hint.block_id).or(diffs.first())?;
    let action = if root.is_create() {
        ChangeAction::Add
    } else if root.is_delete() {
        ChangeAction::Delete
    } else {
        ChangeAction::Update
    };
    Some(BlockChangeEvent {
        action,
        workspace_id: hint.workspace_id.clone(),
        board: root.board.clone(),
        card: root.card.clone(),
        block_changed: root.block()?.clone(),
        block_old: root.old_block.clone(),
        modified_by_id: hint.modified_by_id.clone(),
    })
}

#[async_trait]
impl HintProcessor for Dispatcher {
    async fn process_due(&self, now: Millis) -> Result<BatchReport, NotifyError> {
        let mut report = BatchReport::default();
        let mut taken = HashSet::new();

        loop {
            let hint = match self.hints.next_due(now).await {
                Ok(NextHint::Due(hint)) if taken.contains(&hint.block_id) => {
                    // Put back by this pass after a failed delivery.
                    match self.hints.reschedule(&hint, now).await {
                        Ok(retry) => report.next_notify_at = Some(retry.notify_at),
                        Err(e) => report.failures.push(e),
                    }
                    break;
                }
                Ok(NextHint::Due(hint)) => hint,
                Ok(NextHint::Pending(at)) => {
                    report.next_notify_at = Some(at);
                    break;
                }
                Ok(NextHint::Empty) => break,
                Err(e) => {
                    report.failures.push(e);
                    return Err(NotifyError::Multiple(report.failures));
                }
            };

            taken.insert(hint.block_id.clone());
            report.processed += 1;
            match self.notify_hint(&hint).await {
                Ok(()) => {}
                Err(e) if e.is_skippable() => {
                    tracing::warn!(block_id = %hint.block_id, error = %e, "Skipping hint");
                }
                Err(e) => {
                    tracing::error!(block_id = %hint.block_id, error = %e, "Hint processing failed");
                    report.failures.push(e);
                }
            }
        }

        Ok(report)
    }
}
