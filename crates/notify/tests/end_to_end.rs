//! End-to-end notification scenarios over the in-memory store.
//!
//! Each test seeds block history, records hints, runs one batch pass through
//! the dispatcher and inspects what reached the recording delivery.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use boardwatch_core::{Block, BlockKind, ChangeAction, Millis, NotificationHint, NotifyFrequencies};
use boardwatch_db::{MemoryStore, Store};
use boardwatch_notify::backend::{Backend, MentionsBackend, SubscriptionBackend};
use boardwatch_notify::delivery::NotificationKind;
use boardwatch_notify::render::MarkdownHelpers;
use boardwatch_notify::{HintProcessor, NotifyError};

use common::*;

/// Card hints are due one minute after the change.
const CARD_DELAY: Millis = 60_000;

async fn record_card_hint(store: &Arc<MemoryStore>, card_id: &str, by: &str, at: Millis) {
    let hint = NotificationHint::new(BlockKind::Card, card_id, WORKSPACE, by, at);
    hint_store(store.clone())
        .upsert(&hint)
        .await
        .expect("upsert hint");
}

async fn notified_at(store: &MemoryStore, block_id: &str, user_id: &str) -> Millis {
    store
        .subscriptions()
        .await
        .into_iter()
        .find(|s| s.block_id == block_id && s.subscriber_id == user_id)
        .map(|s| s.notified_at)
        .expect("subscription exists")
}

/// Card `card1` renamed from "Draft" to "Final" in two edits after `1000`.
async fn renamed_card_store() -> Arc<MemoryStore> {
    let store = seeded_store().await;
    let card = store.get_block("card1").await.unwrap();
    store.save_block(version(&card, "Draft", 1100)).await;
    store.save_block(version(&card, "Final", 1200)).await;
    store
}

// ---------------------------------------------------------------------------
// Test: a title change is rendered as new text with the old one struck out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn title_change_is_reported_to_subscriber() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(1200 + CARD_DELAY)
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failures.is_empty());

    let sent = delivery.sent().await;
    assert_eq!(sent.len(), 1);
    let notification = &sent[0];
    assert_eq!(notification.kind, NotificationKind::Changes);
    assert_eq!(notification.subscriber.subscriber_id, "u-bob");
    assert_eq!(notification.author, "alice");
    assert_eq!(notification.board_id, BOARD);

    assert_eq!(notification.attachments.len(), 1);
    let fields = &notification.attachments[0].fields;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].title, "Title");
    assert_eq!(fields[0].value, "Final  ~~`Draft`~~");

    assert!(notification.text.contains("@alice has modified"));
    assert!(notification
        .text
        .contains("[Final](http://boards.test/workspace/ws1/board1/0/card1)"));

    assert_eq!(notified_at(&store, "card1", "u-bob").await, 1200);
    assert!(store.hints().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: the author of a change is not told about it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn author_is_not_notified() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-alice", 1000).await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    dispatcher(store.clone(), delivery.clone())
        .process_due(1200 + CARD_DELAY)
        .await
        .unwrap();

    assert_eq!(delivery.recipients().await, vec!["u-bob".to_string()]);
    assert_eq!(notified_at(&store, "card1", "u-alice").await, 1200);
    assert_eq!(notified_at(&store, "card1", "u-bob").await, 1200);
}

// ---------------------------------------------------------------------------
// Test: a subscriber who has already seen the changes gets nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn up_to_date_subscriber_is_skipped() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    subscribe(&store, BlockKind::Card, "card1", "u-carol", 1200).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    dispatcher(store.clone(), delivery.clone())
        .process_due(1200 + CARD_DELAY)
        .await
        .unwrap();

    assert_eq!(delivery.recipients().await, vec!["u-bob".to_string()]);
}

// ---------------------------------------------------------------------------
// Test: a new comment becomes one comment field
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_comment_is_reported_through_subscription_backend() {
    let store = seeded_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;

    let board = store.get_block(BOARD).await.unwrap();
    let card = store.get_block("card1").await.unwrap();
    let comment = block("cm1", "card1", BlockKind::Comment, "Looks good", 1500);
    store.save_block(comment.clone()).await;

    let delivery = RecordingDelivery::new();
    let backend = SubscriptionBackend::new(
        store.clone(),
        delivery.clone(),
        Arc::new(NotifyFrequencies::default()),
        attachment_options(),
    );
    backend
        .block_changed(&change(
            ChangeAction::Add,
            &board,
            Some(&card),
            &comment,
            None,
            "u-alice",
        ))
        .await
        .unwrap();

    // Only the card has subscribers.
    let hints = store.hints().await;
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].block_id, "card1");

    dispatcher(store.clone(), delivery.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();

    let sent = delivery.sent().await;
    assert_eq!(sent.len(), 1);
    let fields = &sent[0].attachments[0].fields;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].title, "Comment");
    assert_eq!(fields[0].value, "Looks good");
    assert!(!fields[0].value.contains("~~"));

    assert!(notified_at(&store, "card1", "u-bob").await >= 1500);
}

// ---------------------------------------------------------------------------
// Test: adding a card subscribes its author and records a hint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_card_subscribes_author() {
    let store = seeded_store().await;
    let board = store.get_block(BOARD).await.unwrap();
    let card = block("card2", BOARD, BlockKind::Card, "Spec review", 2000);
    store.save_block(card.clone()).await;

    let backend = SubscriptionBackend::new(
        store.clone(),
        RecordingDelivery::new(),
        Arc::new(NotifyFrequencies::default()),
        attachment_options(),
    );
    backend
        .block_changed(&change(
            ChangeAction::Add,
            &board,
            Some(&card),
            &card,
            None,
            "u-bob",
        ))
        .await
        .unwrap();

    let subs = store.subscriptions().await;
    assert!(subs
        .iter()
        .any(|s| s.block_id == "card2" && s.subscriber_id == "u-bob"));

    let hints = store.hints().await;
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].block_id, "card2");
    assert_eq!(hints[0].modified_by_id, "u-bob");
}

// ---------------------------------------------------------------------------
// Test: one failing delivery does not stop the others
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivery_failure_is_collected() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    subscribe(&store, BlockKind::Card, "card1", "u-carol", 1000).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    delivery.fail_for("u-bob").await;

    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(1200 + CARD_DELAY)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_matches!(
        &report.failures[0],
        NotifyError::Delivery { subscriber_id, .. } if subscriber_id == "u-bob"
    );
    assert_eq!(delivery.recipients().await, vec!["u-carol".to_string()]);
}

// ---------------------------------------------------------------------------
// Test: a subscriber whose delivery failed gets the change on the next pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_delivery_is_retried_on_next_pass() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    subscribe(&store, BlockKind::Card, "card1", "u-carol", 1000).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let flaky = RecordingDelivery::new();
    flaky.fail_for("u-bob").await;
    let report = dispatcher(store.clone(), flaky.clone())
        .process_due(1200 + CARD_DELAY)
        .await
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(flaky.recipients().await, vec!["u-carol".to_string()]);

    // Carol is caught up; bob keeps his old stamp and the hint is back.
    assert_eq!(notified_at(&store, "card1", "u-carol").await, 1200);
    assert_eq!(notified_at(&store, "card1", "u-bob").await, 1000);
    let hints = store.hints().await;
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].block_id, "card1");
    assert_eq!(hints[0].modified_by_id, "u-alice");

    let healthy = RecordingDelivery::new();
    let report = dispatcher(store.clone(), healthy.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failures.is_empty());

    let sent = healthy.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subscriber.subscriber_id, "u-bob");
    assert_eq!(sent[0].attachments[0].fields[0].value, "Final  ~~`Draft`~~");
    assert!(notified_at(&store, "card1", "u-bob").await >= 1200);
    assert!(store.hints().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: a hint that keeps failing is handed out once per pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_hint_is_taken_once_per_pass() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    delivery.fail_for("u-bob").await;
    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.next_notify_at.is_some());
    assert_eq!(store.hints().await.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: one edit to a card that existed before the subscriber's last
// notification is reported against the version they last saw
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_edit_to_existing_card_is_reported() {
    let store = seeded_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;

    let board = store.get_block(BOARD).await.unwrap();
    let draft = store.get_block("card1").await.unwrap();
    let final_card = version(&draft, "Final", 1200);
    store.save_block(final_card.clone()).await;

    let delivery = RecordingDelivery::new();
    let backend = SubscriptionBackend::new(
        store.clone(),
        delivery.clone(),
        Arc::new(NotifyFrequencies::default()),
        attachment_options(),
    );
    backend
        .block_changed(&change(
            ChangeAction::Update,
            &board,
            Some(&final_card),
            &final_card,
            Some(&draft),
            "u-alice",
        ))
        .await
        .unwrap();

    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.failures.is_empty());

    let sent = delivery.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subscriber.subscriber_id, "u-bob");
    let fields = &sent[0].attachments[0].fields;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].title, "Title");
    assert_eq!(fields[0].value, "Final  ~~`Draft`~~");
    assert!(notified_at(&store, "card1", "u-bob").await >= 1200);
}

// ---------------------------------------------------------------------------
// Test: a board with a malformed property schema is skipped and the rest of
// the batch still goes out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_board_schema_skips_only_its_hint() {
    let store = renamed_card_store().await;

    let mut broken_board = block("board2", "", BlockKind::Board, "Broken", 100);
    broken_board.board_id = "board2".to_string();
    broken_board
        .fields
        .insert("cardProperties".to_string(), serde_json::json!("not a list"));
    store.save_block(broken_board).await;
    let orphan = Block {
        board_id: "board2".to_string(),
        ..block("card9", "board2", BlockKind::Card, "Before", 100)
    };
    store.save_block(orphan.clone()).await;
    store.save_block(version(&orphan, "After", 1100)).await;

    subscribe(&store, BlockKind::Card, "card9", "u-bob", 1000).await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    record_card_hint(&store, "card9", "u-alice", 1100).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert!(report.failures.is_empty());
    let sent = delivery.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].block_id, "card1");
    assert!(store.hints().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: store failures on several hints are all reported
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_collects_every_failure() {
    let store = seeded_store().await;
    for (id, at) in [("card2", 300), ("card3", 400), ("card4", 500)] {
        let card = block(id, BOARD, BlockKind::Card, "Before", 100);
        store.save_block(card.clone()).await;
        store.save_block(version(&card, "Before", at + 900)).await;
        store.save_block(version(&card, "After", at + 1000)).await;
        subscribe(&store, BlockKind::Card, id, "u-bob", 1000).await;
        record_card_hint(&store, id, "u-alice", at + 1000).await;
    }
    store.fail_history_for("card2").await;
    store.fail_history_for("card3").await;

    let delivery = RecordingDelivery::new();
    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(delivery.recipients().await, vec!["u-bob".to_string()]);
    assert_eq!(delivery.sent().await[0].block_id, "card4");
    assert_matches!(report.into_result(), Err(NotifyError::Multiple(errors)) if errors.len() == 2);
}

// ---------------------------------------------------------------------------
// Test: a hint for a block that no longer exists is skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_block_is_skipped() {
    let store = seeded_store().await;
    subscribe(&store, BlockKind::Card, "ghost", "u-bob", 0).await;
    record_card_hint(&store, "ghost", "u-alice", 500).await;

    let delivery = RecordingDelivery::new();
    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(Millis::MAX)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert!(report.failures.is_empty());
    assert!(delivery.sent().await.is_empty());
    assert!(store.hints().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: hints not yet due are left alone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_hint_reports_its_due_time() {
    let store = renamed_card_store().await;
    subscribe(&store, BlockKind::Card, "card1", "u-bob", 1000).await;
    record_card_hint(&store, "card1", "u-alice", 1200).await;

    let delivery = RecordingDelivery::new();
    let report = dispatcher(store.clone(), delivery.clone())
        .process_due(1200)
        .await
        .unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.next_notify_at, Some(1200 + CARD_DELAY));
    assert!(delivery.sent().await.is_empty());
    assert_eq!(store.hints().await.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: a mention notifies the user, adds them to the board and subscribes
// them to the card
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mention_notifies_and_subscribes() {
    let store = seeded_store().await;
    let board = store.get_block(BOARD).await.unwrap();
    let card = store.get_block("card1").await.unwrap();

    let delivery = RecordingDelivery::new();
    let subscriptions = Arc::new(SubscriptionBackend::new(
        store.clone(),
        delivery.clone(),
        Arc::new(NotifyFrequencies::default()),
        attachment_options(),
    ));
    let mentions = MentionsBackend::new(
        store.clone(),
        delivery.clone(),
        Arc::new(MarkdownHelpers::new(SITE_URL)),
    );
    mentions.add_listener(subscriptions);

    let comment = block(
        "cm1",
        "card1",
        BlockKind::Comment,
        "hey @Carol and @nobody, cc @alice",
        3000,
    );
    mentions
        .block_changed(&change(
            ChangeAction::Add,
            &board,
            Some(&card),
            &comment,
            None,
            "u-alice",
        ))
        .await
        .unwrap();

    let sent = delivery.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Mention);
    assert_eq!(sent[0].subscriber.subscriber_id, "u-carol");
    assert!(sent[0]
        .text
        .starts_with("@alice mentioned you in [Draft](http://boards.test/workspace/ws1/board1/0/card1)"));

    let members = store.members().await;
    assert!(members
        .iter()
        .any(|m| m.board_id == BOARD && m.user_id == "u-carol" && m.scheme_commenter));
    assert!(store
        .subscriptions()
        .await
        .iter()
        .any(|s| s.block_id == "card1" && s.subscriber_id == "u-carol"));

    // Editing the comment without adding anyone mentions nobody new.
    let edited = version(&comment, "hey @carol and @nobody, cc @alice (edited)", 3100);
    mentions
        .block_changed(&change(
            ChangeAction::Update,
            &board,
            Some(&card),
            &edited,
            Some(&comment),
            "u-alice",
        ))
        .await
        .unwrap();
    assert_eq!(delivery.sent().await.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: mentions outside text and comments are ignored
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mention_in_card_title_is_ignored() {
    let store = seeded_store().await;
    let board = store.get_block(BOARD).await.unwrap();
    let card = block("card2", BOARD, BlockKind::Card, "ask @carol", 3000);

    let delivery = RecordingDelivery::new();
    let mentions = MentionsBackend::new(
        store.clone(),
        delivery.clone(),
        Arc::new(MarkdownHelpers::new(SITE_URL)),
    );
    mentions
        .block_changed(&change(
            ChangeAction::Add,
            &board,
            Some(&card),
            &card,
            None,
            "u-alice",
        ))
        .await
        .unwrap();

    assert!(delivery.sent().await.is_empty());
}
