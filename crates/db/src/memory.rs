//! In-memory [`Store`] for tests and database-less local runs.
//!
//! All state sits behind one `RwLock`; no lock is held across an `.await`
//! outside this module. History rows are kept in insertion order and carry
//! a sequence number so rows with equal `insert_at` still sort stably.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use boardwatch_core::types::duration_millis;
use boardwatch_core::{
    Block, BoardMember, Millis, NotificationHint, Subscriber, Subscription, User,
};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{BlockHistoryOptions, Store};

#[derive(Default)]
struct Inner {
    blocks: HashMap<String, Block>,
    /// `(sequence, row)` in insertion order.
    history: Vec<(u64, Block)>,
    next_seq: u64,
    users: HashMap<String, User>,
    members: HashMap<(String, String), BoardMember>,
    subscriptions: Vec<Subscription>,
    hints: HashMap<String, NotificationHint>,
    failing_blocks: HashSet<String>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a block version: replaces the live row and appends a history row.
    ///
    /// The history row's `insert_at` is the block's `insert_at` when set,
    /// otherwise its `update_at`.
    pub async fn save_block(&self, mut block: Block) {
        if block.insert_at == 0 {
            block.insert_at = block.update_at;
        }
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.history.push((seq, block.clone()));
        let mut live = block;
        live.insert_at = 0;
        inner.blocks.insert(live.id.clone(), live);
    }

    /// Remove the live row of a block, leaving its history in place.
    pub async fn purge_block(&self, block_id: &str) {
        self.inner.write().await.blocks.remove(block_id);
    }

    pub async fn add_user(&self, user: User) {
        self.inner.write().await.users.insert(user.id.clone(), user);
    }

    /// Make every history lookup for `block_id` fail with a database error.
    pub async fn fail_history_for(&self, block_id: &str) {
        self.inner
            .write()
            .await
            .failing_blocks
            .insert(block_id.to_string());
    }

    /// Snapshot of all pending hints, earliest `notify_at` first.
    pub async fn hints(&self) -> Vec<NotificationHint> {
        let mut hints: Vec<_> = self.inner.read().await.hints.values().cloned().collect();
        hints.sort_by(|a, b| a.notify_at.cmp(&b.notify_at).then(a.block_id.cmp(&b.block_id)));
        hints
    }

    /// Snapshot of all subscriptions, active or not.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.read().await.subscriptions.clone()
    }

    pub async fn members(&self) -> Vec<BoardMember> {
        self.inner.read().await.members.values().cloned().collect()
    }

    fn select_history<'a>(
        rows: impl Iterator<Item = &'a (u64, Block)>,
        opts: &BlockHistoryOptions,
    ) -> Vec<Block> {
        let mut selected: Vec<&(u64, Block)> = rows
            .filter(|(_, b)| opts.after_insert_at.map_or(true, |t| b.insert_at > t))
            .filter(|(_, b)| opts.before_insert_at.map_or(true, |t| b.insert_at < t))
            .collect();
        selected.sort_by(|(sa, a), (sb, b)| a.insert_at.cmp(&b.insert_at).then(sa.cmp(sb)));
        if opts.descending {
            selected.reverse();
        }
        let limit = opts
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        selected
            .into_iter()
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

fn injected_failure(block_id: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!(
        "injected history failure for block {block_id}"
    )))
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_block(&self, block_id: &str) -> Result<Block, StoreError> {
        self.inner
            .read()
            .await
            .blocks
            .get(block_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("block", block_id))
    }

    async fn get_block_history(
        &self,
        block_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<Block>, StoreError> {
        let inner = self.inner.read().await;
        if inner.failing_blocks.contains(block_id) {
            return Err(injected_failure(block_id));
        }
        Ok(Self::select_history(
            inner.history.iter().filter(|(_, b)| b.id == block_id),
            opts,
        ))
    }

    async fn get_sub_tree2_from_history(
        &self,
        root_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<Block>, StoreError> {
        let inner = self.inner.read().await;
        if inner.failing_blocks.contains(root_id) {
            return Err(injected_failure(root_id));
        }
        Ok(Self::select_history(
            inner
                .history
                .iter()
                .filter(|(_, b)| b.id == root_id || b.parent_id == root_id),
            opts,
        ))
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", username))
    }

    async fn get_member_for_board(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> Result<BoardMember, StoreError> {
        self.inner
            .read()
            .await
            .members
            .get(&(board_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found("board member", format!("{board_id}/{user_id}")))
    }

    async fn save_member(&self, member: &BoardMember) -> Result<BoardMember, StoreError> {
        self.inner.write().await.members.insert(
            (member.board_id.clone(), member.user_id.clone()),
            member.clone(),
        );
        Ok(member.clone())
    }

    async fn create_subscription(&self, sub: &Subscription) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.block_id == sub.block_id && s.subscriber_id == sub.subscriber_id);
        let saved = match existing {
            Some(existing) => {
                existing.subscriber_type = sub.subscriber_type;
                existing.notified_at = sub.notified_at;
                existing.delete_at = 0;
                existing.clone()
            }
            None => {
                let mut created = sub.clone();
                created.delete_at = 0;
                inner.subscriptions.push(created.clone());
                created
            }
        };
        Ok(saved)
    }

    async fn get_subscribers_for_block(
        &self,
        block_id: &str,
    ) -> Result<Vec<Subscriber>, StoreError> {
        let inner = self.inner.read().await;
        let mut subs: Vec<Subscriber> = inner
            .subscriptions
            .iter()
            .filter(|s| s.block_id == block_id && s.is_active())
            .map(|s| Subscriber {
                subscriber_type: s.subscriber_type,
                subscriber_id: s.subscriber_id.clone(),
                notified_at: s.notified_at,
            })
            .collect();
        subs.sort_by(|a, b| {
            a.notified_at
                .cmp(&b.notified_at)
                .then(a.subscriber_id.cmp(&b.subscriber_id))
        });
        Ok(subs)
    }

    async fn get_subscribers_count_for_block(&self, block_id: &str) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        let count = inner
            .subscriptions
            .iter()
            .filter(|s| s.block_id == block_id && s.is_active())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn update_subscribers_notified_at(
        &self,
        block_id: &str,
        notified_at: Millis,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for sub in inner
            .subscriptions
            .iter_mut()
            .filter(|s| s.block_id == block_id && s.is_active())
        {
            sub.notified_at = notified_at;
        }
        Ok(())
    }

    async fn update_subscriber_notified_at(
        &self,
        block_id: &str,
        subscriber_id: &str,
        notified_at: Millis,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(sub) = inner.subscriptions.iter_mut().find(|s| {
            s.block_id == block_id && s.subscriber_id == subscriber_id && s.is_active()
        }) {
            sub.notified_at = notified_at;
        }
        Ok(())
    }

    async fn upsert_notification_hint(
        &self,
        hint: &NotificationHint,
        notify_freq: Duration,
    ) -> Result<NotificationHint, StoreError> {
        hint.check()?;
        let notify_at = hint.update_at.saturating_add(duration_millis(notify_freq));
        let mut inner = self.inner.write().await;
        let saved = match inner.hints.get_mut(&hint.block_id) {
            Some(existing) => {
                existing.modified_by_id = hint.modified_by_id.clone();
                existing.username = hint.username.clone();
                existing.update_at = hint.update_at;
                existing.notify_at = notify_at;
                existing.clone()
            }
            None => {
                let mut created = hint.clone();
                created.notify_at = notify_at;
                inner.hints.insert(created.block_id.clone(), created.clone());
                created
            }
        };
        Ok(saved)
    }

    async fn get_next_notification_hint(
        &self,
        remove: bool,
    ) -> Result<NotificationHint, StoreError> {
        let mut inner = self.inner.write().await;
        let next_id = inner
            .hints
            .values()
            .min_by(|a, b| a.notify_at.cmp(&b.notify_at).then(a.block_id.cmp(&b.block_id)))
            .map(|h| h.block_id.clone())
            .ok_or_else(|| StoreError::not_found("notification hint", "next"))?;
        let hint = if remove {
            inner.hints.remove(&next_id)
        } else {
            inner.hints.get(&next_id).cloned()
        };
        hint.ok_or_else(|| StoreError::not_found("notification hint", next_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use boardwatch_core::BlockKind;

    fn block(id: &str, parent: &str, kind: BlockKind, title: &str, at: Millis) -> Block {
        Block {
            id: id.into(),
            parent_id: parent.into(),
            board_id: "board1".into(),
            workspace_id: "ws1".into(),
            created_by: "u1".into(),
            modified_by: "u1".into(),
            kind,
            title: title.into(),
            fields: Default::default(),
            create_at: at,
            update_at: at,
            delete_at: 0,
            insert_at: 0,
        }
    }

    #[tokio::test]
    async fn history_filters_and_orders_by_insert_time() {
        let store = MemoryStore::new();
        store.save_block(block("c1", "board1", BlockKind::Card, "v1", 10)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "v2", 20)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "v3", 30)).await;

        let rows = store
            .get_block_history("c1", &BlockHistoryOptions::after(10))
            .await
            .unwrap();
        let titles: Vec<&str> = rows.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["v2", "v3"]);

        let latest = store
            .get_block_history("c1", &BlockHistoryOptions::latest())
            .await
            .unwrap();
        assert_eq!(latest[0].title, "v3");

        let live = store.get_block("c1").await.unwrap();
        assert_eq!(live.title, "v3");
        assert_eq!(live.insert_at, 0);
    }

    #[tokio::test]
    async fn sub_tree_includes_root_and_children_only() {
        let store = MemoryStore::new();
        store.save_block(block("board1", "", BlockKind::Board, "B", 1)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "C", 2)).await;
        store.save_block(block("t1", "c1", BlockKind::Text, "T", 3)).await;
        store.save_block(block("t2", "c2", BlockKind::Text, "other", 4)).await;

        let rows = store
            .get_sub_tree2_from_history("c1", &BlockHistoryOptions::default())
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "t1"]);
    }

    #[tokio::test]
    async fn board_and_card_resolution() {
        let store = MemoryStore::new();
        store.save_block(block("board1", "", BlockKind::Board, "B", 1)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "C", 2)).await;
        let text = block("t1", "c1", BlockKind::Text, "T", 3);
        store.save_block(text.clone()).await;

        let (board, card) = store.get_board_and_card(&text).await.unwrap();
        assert_eq!(board.id, "board1");
        assert_eq!(card.map(|c| c.id), Some("c1".to_string()));

        let board_block = store.get_block("board1").await.unwrap();
        let (board, card) = store.get_board_and_card(&board_block).await.unwrap();
        assert_eq!(board.id, "board1");
        assert!(card.is_none());
    }

    #[tokio::test]
    async fn deleted_ancestors_resolve_from_history() {
        let store = MemoryStore::new();
        store.save_block(block("board1", "", BlockKind::Board, "B", 1)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "C", 2)).await;
        store.purge_block("c1").await;
        let text = block("t1", "c1", BlockKind::Text, "T", 3);

        let (_, card) = store.get_board_and_card(&text).await.unwrap();
        assert_eq!(card.map(|c| c.title), Some("C".to_string()));
    }

    #[tokio::test]
    async fn missing_board_is_not_found() {
        let store = MemoryStore::new();
        let text = block("t1", "c1", BlockKind::Text, "T", 3);
        let err = store.get_board_and_card(&text).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn hint_upsert_keeps_one_row_per_block() {
        let store = MemoryStore::new();
        let freq = Duration::from_secs(60);
        let mut hint = NotificationHint::new(BlockKind::Card, "c1", "ws1", "u1", 1_000);

        let first = store.upsert_notification_hint(&hint, freq).await.unwrap();
        assert_eq!(first.notify_at, 61_000);

        hint.update_at = 5_000;
        hint.create_at = 5_000;
        hint.modified_by_id = "u2".into();
        let second = store.upsert_notification_hint(&hint, freq).await.unwrap();
        assert_eq!(second.notify_at, 65_000);
        assert_eq!(second.create_at, 1_000);
        assert_eq!(second.modified_by_id, "u2");

        assert_eq!(store.hints().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_hint_is_rejected() {
        let store = MemoryStore::new();
        let hint = NotificationHint::new(BlockKind::Card, "", "ws1", "u1", 1);
        let err = store
            .upsert_notification_hint(&hint, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Invalid(_));
    }

    #[tokio::test]
    async fn next_hint_peeks_and_removes_earliest() {
        let store = MemoryStore::new();
        let late = NotificationHint::new(BlockKind::Board, "b1", "ws1", "u1", 0);
        let soon = NotificationHint::new(BlockKind::Card, "c1", "ws1", "u1", 0);
        store
            .upsert_notification_hint(&late, Duration::from_secs(100))
            .await
            .unwrap();
        store
            .upsert_notification_hint(&soon, Duration::from_secs(1))
            .await
            .unwrap();

        let peeked = store.get_next_notification_hint(false).await.unwrap();
        assert_eq!(peeked.block_id, "c1");
        assert_eq!(store.hints().await.len(), 2);

        let taken = store.get_next_notification_hint(true).await.unwrap();
        assert_eq!(taken.block_id, "c1");
        let taken = store.get_next_notification_hint(true).await.unwrap();
        assert_eq!(taken.block_id, "b1");

        let err = store.get_next_notification_hint(true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn subscriptions_are_unique_and_sorted_by_notified_at() {
        let store = MemoryStore::new();
        let mut a = Subscription::for_user(BlockKind::Card, "c1", "ws1", "alice", 50);
        let b = Subscription::for_user(BlockKind::Card, "c1", "ws1", "bob", 10);
        store.create_subscription(&a).await.unwrap();
        store.create_subscription(&b).await.unwrap();
        a.notified_at = 70;
        store.create_subscription(&a).await.unwrap();

        let subs = store.get_subscribers_for_block("c1").await.unwrap();
        let ids: Vec<&str> = subs.iter().map(|s| s.subscriber_id.as_str()).collect();
        assert_eq!(ids, vec!["bob", "alice"]);
        assert_eq!(store.get_subscribers_count_for_block("c1").await.unwrap(), 2);

        store.update_subscribers_notified_at("c1", 99).await.unwrap();
        let subs = store.get_subscribers_for_block("c1").await.unwrap();
        assert!(subs.iter().all(|s| s.notified_at == 99));

        store.update_subscriber_notified_at("c1", "bob", 120).await.unwrap();
        let subs = store.get_subscribers_for_block("c1").await.unwrap();
        let stamps: Vec<(&str, Millis)> = subs
            .iter()
            .map(|s| (s.subscriber_id.as_str(), s.notified_at))
            .collect();
        assert_eq!(stamps, vec![("alice", 99), ("bob", 120)]);
    }

    #[tokio::test]
    async fn version_at_reads_history_up_to_the_given_time() {
        let store = MemoryStore::new();
        store.save_block(block("c1", "board1", BlockKind::Card, "v1", 10)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "v2", 20)).await;
        store.save_block(block("c1", "board1", BlockKind::Card, "v3", 30)).await;

        let at = |t| store.get_block_version_at("c1", t);
        assert_eq!(at(25).await.unwrap().map(|b| b.title), Some("v2".to_string()));
        assert_eq!(at(20).await.unwrap().map(|b| b.title), Some("v2".to_string()));
        assert!(at(5).await.unwrap().is_none());
    }
}
