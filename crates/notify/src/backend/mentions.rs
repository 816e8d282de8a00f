//! `@mention` notifications.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use boardwatch_core::{
    now_millis, BlockChangeEvent, BlockKind, ChangeAction, Subscriber, SubscriberType, User,
};
use boardwatch_db::Store;
use regex::Regex;

use super::{Backend, MentionListener};
use crate::delivery::{Delivery, NotificationKind, RenderedNotification};
use crate::error::NotifyError;
use crate::render::TemplateHelpers;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9_@])@([a-z0-9._-]+)").expect("valid regex")
});

/// Usernames mentioned in `text`, lowercased, without trailing dots.
pub fn extract_mentions(text: &str) -> BTreeSet<String> {
    MENTION_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Backend that notifies users mentioned in text and comment blocks.
pub struct MentionsBackend {
    store: Arc<dyn Store>,
    delivery: Arc<dyn Delivery>,
    helpers: Arc<dyn TemplateHelpers>,
    listeners: RwLock<Vec<Arc<dyn MentionListener>>>,
}

impl MentionsBackend {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<dyn Delivery>,
        helpers: Arc<dyn TemplateHelpers>,
    ) -> Self {
        Self {
            store,
            delivery,
            helpers,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MentionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn remove_listener(&self, name: &str) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|l| l.name() != name);
    }

    fn listeners(&self) -> Vec<Arc<dyn MentionListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn author_name(&self, user_id: &str) -> String {
        match self.store.get_user_by_id(user_id).await {
            Ok(user) if !user.username.is_empty() => user.username,
            _ => user_id.to_string(),
        }
    }

    async fn deliver_mention(
        &self,
        user: &User,
        author: &str,
        event: &BlockChangeEvent,
    ) -> Result<(), NotifyError> {
        let block = &event.block_changed;
        let location = match event.card.as_ref() {
            Some(card) => self.helpers.make_card_link(card),
            None => event
                .board
                .as_ref()
                .map(|b| self.helpers.make_board_link(b))
                .unwrap_or_default(),
        };
        let excerpt = self.helpers.strip_newlines(&self.helpers.description(block));

        let rendered = RenderedNotification {
            kind: NotificationKind::Mention,
            subscriber: Subscriber {
                subscriber_type: SubscriberType::User,
                subscriber_id: user.id.clone(),
                notified_at: 0,
            },
            workspace_id: event.workspace_id.clone(),
            board_id: event
                .board
                .as_ref()
                .map(|b| b.id.clone())
                .unwrap_or_default(),
            block_id: block.id.clone(),
            author: author.to_string(),
            attachments: Vec::new(),
            text: format!("@{author} mentioned you in {location}\n> {excerpt}"),
            created_at: now_millis(),
        };

        self.delivery
            .deliver(event, &rendered)
            .await
            .map_err(|source| NotifyError::Delivery {
                subscriber_id: user.id.clone(),
                source,
            })
    }
}

#[async_trait]
impl Backend for MentionsBackend {
    fn name(&self) -> &str {
        "mentions"
    }

    async fn start(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn block_changed(&self, event: &BlockChangeEvent) -> Result<(), NotifyError> {
        let block = &event.block_changed;
        if event.action == ChangeAction::Delete
            || !matches!(block.kind, BlockKind::Text | BlockKind::Comment)
        {
            return Ok(());
        }

        let mut mentions = extract_mentions(&block.title);
        if let Some(old) = event.block_old.as_ref() {
            for seen in extract_mentions(&old.title) {
                mentions.remove(&seen);
            }
        }
        if mentions.is_empty() {
            return Ok(());
        }

        let author = self.author_name(&event.modified_by_id).await;
        let listeners = self.listeners();
        let mut failures = Vec::new();

        for username in mentions {
            let user = match self.store.get_user_by_username(&username).await {
                Ok(user) => user,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(username = %username, "Mentioned user does not exist");
                    continue;
                }
                Err(e) => {
                    failures.push(NotifyError::store(format!("resolve mention @{username}"), e));
                    continue;
                }
            };
            if user.id == event.modified_by_id {
                continue;
            }

            tracing::debug!(user_id = %user.id, block_id = %block.id, "User mentioned");

            if let Err(e) = self.deliver_mention(&user, &author, event).await {
                failures.push(e);
            }
            for listener in &listeners {
                if let Err(e) = listener.on_mention(&user, event).await {
                    tracing::warn!(listener = listener.name(), error = %e, "Mention listener failed");
                    failures.push(e);
                }
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(NotifyError::Multiple(failures)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
