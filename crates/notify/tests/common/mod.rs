#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use boardwatch_core::{
    Block, BlockChangeEvent, BlockKind, ChangeAction, Millis, NotifyFrequencies, Subscription, User,
};
use boardwatch_db::{MemoryStore, Store};
use boardwatch_notify::delivery::{Delivery, DeliveryError, RenderedNotification};
use boardwatch_notify::render::{AttachmentOptions, MarkdownHelpers, TemplateRegistry};
use boardwatch_notify::{Dispatcher, HintStore};
use tokio::sync::Mutex;

pub const WORKSPACE: &str = "ws1";
pub const BOARD: &str = "board1";
pub const SITE_URL: &str = "http://boards.test";

/// Build a block row with the given timestamps. `insert_at` is the history
/// insertion time; the store falls back to `update_at` when it is zero.
pub fn block(id: &str, parent: &str, kind: BlockKind, title: &str, create_at: Millis) -> Block {
    Block {
        id: id.to_string(),
        parent_id: parent.to_string(),
        board_id: BOARD.to_string(),
        workspace_id: WORKSPACE.to_string(),
        created_by: "u-alice".to_string(),
        modified_by: "u-alice".to_string(),
        kind,
        title: title.to_string(),
        fields: Default::default(),
        create_at,
        update_at: create_at,
        delete_at: 0,
        insert_at: 0,
    }
}

/// A later version of `block` written at `at`.
pub fn version(block: &Block, title: &str, at: Millis) -> Block {
    Block {
        title: title.to_string(),
        update_at: at,
        insert_at: at,
        ..block.clone()
    }
}

pub fn user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
    }
}

/// A store with a board, users alice, bob and carol, and a card created at
/// `100`.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_user(user("u-alice", "alice")).await;
    store.add_user(user("u-bob", "bob")).await;
    store.add_user(user("u-carol", "carol")).await;
    store
        .save_block(block(BOARD, "", BlockKind::Board, "Roadmap", 100))
        .await;
    store
        .save_block(block("card1", BOARD, BlockKind::Card, "Draft", 100))
        .await;
    store
}

/// Subscribe `user_id` to `block_id`, last notified at `notified_at`.
pub async fn subscribe(
    store: &MemoryStore,
    kind: BlockKind,
    block_id: &str,
    user_id: &str,
    notified_at: Millis,
) {
    let sub = Subscription::for_user(kind, block_id, WORKSPACE, user_id, notified_at);
    store
        .create_subscription(&sub)
        .await
        .expect("create subscription");
}

pub fn attachment_options() -> AttachmentOptions {
    let registry = Arc::new(TemplateRegistry::new().expect("template registry"));
    AttachmentOptions::new(registry, Arc::new(MarkdownHelpers::new(SITE_URL)))
}

pub fn hint_store(store: Arc<MemoryStore>) -> HintStore {
    HintStore::new(store, Arc::new(NotifyFrequencies::default()))
}

pub fn dispatcher(store: Arc<MemoryStore>, delivery: Arc<RecordingDelivery>) -> Dispatcher {
    Dispatcher::new(
        store.clone(),
        hint_store(store),
        delivery,
        attachment_options(),
    )
}

/// A change event for `changed` on the seeded board.
pub fn change(
    action: ChangeAction,
    board: &Block,
    card: Option<&Block>,
    changed: &Block,
    old: Option<&Block>,
    by: &str,
) -> BlockChangeEvent {
    BlockChangeEvent {
        action,
        workspace_id: WORKSPACE.to_string(),
        board: Some(board.clone()),
        card: card.cloned(),
        block_changed: changed.clone(),
        block_old: old.cloned(),
        modified_by_id: by.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Recording delivery
// ---------------------------------------------------------------------------

/// Delivery that keeps every notification it is given, optionally
/// rejecting some subscribers.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<RenderedNotification>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingDelivery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn fail_for(&self, subscriber_id: &str) {
        self.failing.lock().await.push(subscriber_id.to_string());
    }

    pub async fn sent(&self) -> Vec<RenderedNotification> {
        self.sent.lock().await.clone()
    }

    pub async fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|n| n.subscriber.subscriber_id.clone())
            .collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        _event: &BlockChangeEvent,
        rendered: &RenderedNotification,
    ) -> Result<(), DeliveryError> {
        if self
            .failing
            .lock()
            .await
            .contains(&rendered.subscriber.subscriber_id)
        {
            return Err(DeliveryError::Rejected(format!(
                "subscriber {} rejected",
                rendered.subscriber.subscriber_id
            )));
        }
        self.sent.lock().await.push(rendered.clone());
        Ok(())
    }
}
