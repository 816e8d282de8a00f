//! Per-block-type notification frequencies.
//!
//! Changes are coalesced: a block is notified about at most once per
//! frequency window for its kind. Boards are noisy and get a daily digest
//! cadence; cards and everything else are notified about a minute after the
//! last edit.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::block::BlockKind;
use crate::types::{duration_millis, Millis};

/// Default frequency for board changes.
pub const DEFAULT_BOARD_FREQUENCY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default frequency for card changes.
pub const DEFAULT_CARD_FREQUENCY: Duration = Duration::from_secs(60);

/// Default frequency for every other block kind.
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60);

/// Lookup table from block kind to notification frequency.
///
/// Shared by reference between the backend and the notifier; entries may be
/// changed after construction through [`NotifyFrequencies::set`].
#[derive(Debug)]
pub struct NotifyFrequencies {
    by_kind: RwLock<HashMap<BlockKind, Duration>>,
    fallback: Duration,
}

impl NotifyFrequencies {
    /// Build a table with explicit board, card and fallback frequencies.
    pub fn new(board: Duration, card: Duration, fallback: Duration) -> Self {
        let mut by_kind = HashMap::new();
        by_kind.insert(BlockKind::Board, board);
        by_kind.insert(BlockKind::Card, card);
        Self {
            by_kind: RwLock::new(by_kind),
            fallback,
        }
    }

    /// Frequency for a block kind.
    pub fn get(&self, kind: &BlockKind) -> Duration {
        self.by_kind
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(kind)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Frequency for kinds without an entry of their own.
    pub fn fallback(&self) -> Duration {
        self.fallback
    }

    /// Override the frequency for a block kind.
    pub fn set(&self, kind: BlockKind, frequency: Duration) {
        self.by_kind
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(kind, frequency);
    }

    /// When a change made at `update_at` to a block of `kind` is due.
    pub fn notify_at(&self, kind: &BlockKind, update_at: Millis) -> Millis {
        update_at.saturating_add(duration_millis(self.get(kind)))
    }
}

impl Default for NotifyFrequencies {
    fn default() -> Self {
        Self::new(
            DEFAULT_BOARD_FREQUENCY,
            DEFAULT_CARD_FREQUENCY,
            DEFAULT_FREQUENCY,
        )
    }
}
