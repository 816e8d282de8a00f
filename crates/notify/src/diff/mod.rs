//! Structured before/after diffs of blocks.
//!
//! A [`Diff`] tree is rooted at a board or card diff and has at most
//! [`MAX_DIFF_DEPTH`] level of children (content blocks and comments).
//! [`generator::DiffGenerator`] builds the trees from block history;
//! [`crate::render`] turns them into text.

pub mod generator;
pub mod props;

use boardwatch_core::{Block, BlockKind, Millis};

use crate::error::NotifyError;

pub use generator::DiffGenerator;

/// Deepest level a child diff may sit at below its root.
pub const MAX_DIFF_DEPTH: usize = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One block's before/after state plus its board/card context.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
    pub board: Option<Block>,
    pub card: Option<Block>,
    /// Display name of the user who made the change.
    pub username: String,
    pub block_type: BlockKind,
    /// State at the start of the window; `None` for a block created in it.
    pub old_block: Option<Block>,
    /// State at the end of the window.
    pub new_block: Option<Block>,
    /// Insertion time of the newest version seen.
    pub update_at: Millis,
    pub prop_diffs: Vec<PropDiff>,
    pub schema_diffs: Vec<SchemaDiff>,
    pub diffs: Vec<Diff>,
}

/// A change to one custom property value of a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropDiff {
    pub id: String,
    /// Position of the property in the board's schema.
    pub index: usize,
    pub name: String,
    pub old_value: String,
    pub new_value: String,
}

/// A change to a board's property definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDiff {
    Added {
        id: String,
        name: String,
    },
    Removed {
        id: String,
        name: String,
    },
    Renamed {
        id: String,
        old_name: String,
        new_name: String,
    },
}

impl Diff {
    /// A diff of `block` between `old` and `new` with no context attached.
    pub fn new(block_type: BlockKind, old_block: Option<Block>, new_block: Option<Block>) -> Self {
        let update_at = new_block
            .as_ref()
            .or(old_block.as_ref())
            .map(version_time)
            .unwrap_or_default();
        Self {
            board: None,
            card: None,
            username: String::new(),
            block_type,
            old_block,
            new_block,
            update_at,
            prop_diffs: Vec::new(),
            schema_diffs: Vec::new(),
            diffs: Vec::new(),
        }
    }

    pub fn is_create(&self) -> bool {
        self.old_block.is_none() && self.new_block.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.new_block.as_ref().map_or(true, Block::is_deleted)
    }

    pub fn is_modify(&self) -> bool {
        !self.is_create() && !self.is_delete()
    }

    /// The newest known version of the block.
    pub fn block(&self) -> Option<&Block> {
        self.new_block.as_ref().or(self.old_block.as_ref())
    }

    pub fn block_id(&self) -> &str {
        self.block().map_or("", |b| b.id.as_str())
    }

    /// Levels of children below this diff.
    pub fn height(&self) -> usize {
        self.diffs.iter().map(|d| d.height() + 1).max().unwrap_or(0)
    }

    /// Attach a child diff, enforcing [`MAX_DIFF_DEPTH`].
    pub fn push_child(&mut self, child: Diff) -> Result<(), NotifyError> {
        if child.height() + 1 > MAX_DIFF_DEPTH {
            return Err(NotifyError::DiffTooDeep {
                block_id: child.block_id().to_string(),
                max: MAX_DIFF_DEPTH,
            });
        }
        self.diffs.push(child);
        Ok(())
    }

    /// The part of this diff a subscriber last notified at `notified_at` has
    /// not seen yet.
    ///
    /// Children older than `notified_at` are dropped. The diff itself is
    /// kept when it is newer or when any child survives.
    pub fn since(&self, notified_at: Millis) -> Option<Diff> {
        let children: Vec<Diff> = self
            .diffs
            .iter()
            .filter(|d| d.update_at > notified_at)
            .cloned()
            .collect();

        let own_change = self.update_at > notified_at
            && (self.old_block != self.new_block
                || !self.prop_diffs.is_empty()
                || !self.schema_diffs.is_empty());

        if !own_change && children.is_empty() {
            return None;
        }

        let mut diff = self.clone();
        diff.diffs = children;
        Some(diff)
    }
}

/// When a block version was written: its history insertion time when known.
pub(crate) fn version_time(block: &Block) -> Millis {
    if block.insert_at != 0 {
        block.insert_at
    } else {
        block.update_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
