//! Scheduling behaviour of the notifier loop, driven in real time with
//! millisecond frequencies and a scripted batch processor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boardwatch_core::{now_millis, BlockKind, Millis, NotificationHint, NotifyFrequencies};
use boardwatch_db::StoreError;
use boardwatch_notify::{BatchReport, HintProcessor, Notifier, NotifyError};

/// Counts passes. The first `failures` passes fail as if the hint store
/// were unreachable.
#[derive(Default)]
struct ScriptedProcessor {
    passes: AtomicUsize,
    failures: usize,
}

impl ScriptedProcessor {
    fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HintProcessor for ScriptedProcessor {
    async fn process_due(&self, _now: Millis) -> Result<BatchReport, NotifyError> {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst);
        if pass < self.failures {
            return Err(NotifyError::Multiple(vec![NotifyError::store(
                "peek next hint",
                StoreError::not_found("hint", "scripted"),
            )]));
        }
        Ok(BatchReport::default())
    }
}

fn frequencies() -> Arc<NotifyFrequencies> {
    Arc::new(NotifyFrequencies::new(
        Duration::from_secs(10),
        Duration::from_millis(100),
        Duration::from_millis(50),
    ))
}

fn hint(kind: BlockKind, id: &str) -> NotificationHint {
    NotificationHint::new(kind, id, "ws1", "u-alice", now_millis())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

// ---------------------------------------------------------------------------
// Test: starting runs one pass right away, then parks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_runs_an_immediate_pass() {
    let processor = Arc::new(ScriptedProcessor::default());
    let notifier = Notifier::new(frequencies(), processor.clone());

    notifier.start();
    settle().await;

    assert!(notifier.is_running());
    assert_eq!(processor.passes(), 1);
    assert_eq!(notifier.next_wake_at(), None);

    notifier.stop().await;
}

// ---------------------------------------------------------------------------
// Test: a hint wakes the loop once its frequency has passed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hint_schedules_a_pass() {
    let processor = Arc::new(ScriptedProcessor::default());
    let notifier = Notifier::new(frequencies(), processor.clone());
    notifier.start();
    settle().await;

    let before = now_millis();
    notifier.on_notification_hint(hint(BlockKind::Card, "card1"));
    settle().await;

    let wake_at = notifier.next_wake_at().expect("loop has a wake-up time");
    assert!(wake_at >= before + 100);
    assert_eq!(processor.passes(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(processor.passes(), 2);
    assert_eq!(notifier.next_wake_at(), None);

    notifier.stop().await;
}

// ---------------------------------------------------------------------------
// Test: a later hint never pushes the wake-up time back
// ---------------------------------------------------------------------------

#[tokio::test]
async fn earliest_hint_wins() {
    let processor = Arc::new(ScriptedProcessor::default());
    let notifier = Notifier::new(frequencies(), processor.clone());
    notifier.start();
    settle().await;

    notifier.on_notification_hint(hint(BlockKind::Card, "card1"));
    settle().await;
    let card_wake = notifier.next_wake_at().expect("card hint scheduled");

    notifier.on_notification_hint(hint(BlockKind::Board, "board1"));
    settle().await;
    assert_eq!(notifier.next_wake_at(), Some(card_wake));

    notifier.stop().await;
}

// ---------------------------------------------------------------------------
// Test: a later hint that falls due sooner pulls the wake-up time forward
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sooner_hint_moves_wake_up_forward() {
    let processor = Arc::new(ScriptedProcessor::default());
    let notifier = Notifier::new(frequencies(), processor.clone());
    notifier.start();
    settle().await;

    let before = now_millis();
    notifier.on_notification_hint(hint(BlockKind::Board, "board1"));
    settle().await;
    let board_wake = notifier.next_wake_at().expect("board hint scheduled");
    assert!(board_wake >= before + 10_000);

    notifier.on_notification_hint(hint(BlockKind::Card, "card1"));
    settle().await;
    let card_wake = notifier.next_wake_at().expect("card hint scheduled");
    assert!(card_wake < board_wake);
    assert!(card_wake <= now_millis() + 100);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(processor.passes(), 2);

    notifier.stop().await;
}

// ---------------------------------------------------------------------------
// Test: a failed pass is retried after the fallback frequency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_pass_is_retried() {
    let processor = Arc::new(ScriptedProcessor {
        failures: 1,
        ..Default::default()
    });
    let notifier = Notifier::new(frequencies(), processor.clone());
    notifier.start();
    settle().await;

    assert_eq!(processor.passes(), 1);
    assert!(notifier.next_wake_at().is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(processor.passes(), 2);

    notifier.stop().await;
}

// ---------------------------------------------------------------------------
// Test: stopping twice is harmless and later hints are ignored
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_is_idempotent() {
    let processor = Arc::new(ScriptedProcessor::default());
    let notifier = Notifier::new(frequencies(), processor.clone());
    notifier.start();
    notifier.start();
    settle().await;

    notifier.stop().await;
    notifier.stop().await;
    assert!(!notifier.is_running());
    assert_eq!(notifier.next_wake_at(), None);

    notifier.on_notification_hint(hint(BlockKind::Card, "card1"));
    settle().await;
    assert_eq!(processor.passes(), 1);
}
