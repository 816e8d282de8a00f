//! Diff generation for board and content-block hints, read straight from
//! the generator over the in-memory store.

mod common;

use std::sync::Arc;

use boardwatch_core::{Block, BlockKind, Millis, NotificationHint};
use boardwatch_db::{MemoryStore, Store};
use boardwatch_notify::{Diff, DiffGenerator, SchemaDiff};
use serde_json::json;

use common::*;

/// Everyone was last notified here.
const CUTOFF: Millis = 1000;

fn with_card_properties(board: &Block, defs: serde_json::Value, at: Millis) -> Block {
    let mut next = version(board, &board.title, at);
    next.fields.insert("cardProperties".to_string(), defs);
    next
}

async fn diffs_for(store: &Arc<MemoryStore>, kind: BlockKind, block_id: &str) -> Vec<Diff> {
    let hint = NotificationHint::new(kind, block_id, WORKSPACE, "u-alice", 1300);
    DiffGenerator::new(store.clone(), hint, CUTOFF)
        .generate_diffs()
        .await
        .expect("generate diffs")
}

// ---------------------------------------------------------------------------
// Test: a board hint yields the board's schema changes and then each card
// changed in the window with its children
// ---------------------------------------------------------------------------

#[tokio::test]
async fn board_hint_reports_schema_and_card_changes() {
    let store = seeded_store().await;
    let board = store.get_block(BOARD).await.unwrap();
    store
        .save_block(with_card_properties(
            &board,
            json!([{ "id": "p1", "name": "Status", "type": "select" }]),
            500,
        ))
        .await;
    store
        .save_block(with_card_properties(
            &board,
            json!([
                { "id": "p1", "name": "State", "type": "select" },
                { "id": "p2", "name": "Owner", "type": "text" }
            ]),
            1100,
        ))
        .await;

    let card = store.get_block("card1").await.unwrap();
    store.save_block(version(&card, "Final", 1150)).await;
    store
        .save_block(block("cm1", "card1", BlockKind::Comment, "Ship it", 1200))
        .await;

    let diffs = diffs_for(&store, BlockKind::Board, BOARD).await;
    assert_eq!(diffs.len(), 2);

    let board_diff = &diffs[0];
    assert_eq!(board_diff.block_type, BlockKind::Board);
    assert_eq!(
        board_diff.schema_diffs,
        vec![
            SchemaDiff::Renamed {
                id: "p1".into(),
                old_name: "Status".into(),
                new_name: "State".into(),
            },
            SchemaDiff::Added {
                id: "p2".into(),
                name: "Owner".into(),
            },
        ]
    );
    assert!(board_diff.diffs.is_empty());

    let card_diff = &diffs[1];
    assert_eq!(card_diff.block_id(), "card1");
    assert_eq!(card_diff.old_block.as_ref().map(|b| b.title.as_str()), Some("Draft"));
    assert_eq!(card_diff.new_block.as_ref().map(|b| b.title.as_str()), Some("Final"));
    assert_eq!(card_diff.username, "alice");
    assert_eq!(card_diff.update_at, 1200);

    assert_eq!(card_diff.diffs.len(), 1);
    let comment = &card_diff.diffs[0];
    assert_eq!(comment.block_id(), "cm1");
    assert!(comment.is_create());
    assert_eq!(comment.card.as_ref().map(|c| c.id.as_str()), Some("card1"));
}

// ---------------------------------------------------------------------------
// Test: a hint on a content block yields one diff carrying its card
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_block_hint_reports_the_block_with_its_card() {
    let store = seeded_store().await;
    let text = block("t1", "card1", BlockKind::Text, "Steps: one", 200);
    store.save_block(text.clone()).await;
    store
        .save_block(version(&text, "Steps: one, two", 1250))
        .await;

    let diffs = diffs_for(&store, BlockKind::Text, "t1").await;
    assert_eq!(diffs.len(), 1);

    let diff = &diffs[0];
    assert_eq!(diff.block_type, BlockKind::Text);
    assert!(diff.is_modify());
    assert_eq!(diff.old_block.as_ref().map(|b| b.title.as_str()), Some("Steps: one"));
    assert_eq!(diff.new_block.as_ref().map(|b| b.title.as_str()), Some("Steps: one, two"));
    assert_eq!(diff.update_at, 1250);
    assert_eq!(diff.board.as_ref().map(|b| b.id.as_str()), Some(BOARD));
    assert_eq!(diff.card.as_ref().map(|c| c.id.as_str()), Some("card1"));
}

// ---------------------------------------------------------------------------
// Test: a block untouched since the cutoff yields nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_block_yields_no_diffs() {
    let store = seeded_store().await;
    store
        .save_block(block("t1", "card1", BlockKind::Text, "Steps", 200))
        .await;

    assert!(diffs_for(&store, BlockKind::Text, "t1").await.is_empty());
    assert!(diffs_for(&store, BlockKind::Card, "card1").await.is_empty());
}
