//! Block change events emitted by the application layer.

use serde::{Deserialize, Serialize};

use crate::block::Block;

/// What happened to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A single block mutation together with its board/card context.
///
/// `card` is absent when the changed block is a board or a block attached
/// directly to a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockChangeEvent {
    pub action: ChangeAction,
    pub workspace_id: String,
    pub board: Option<Block>,
    pub card: Option<Block>,
    pub block_changed: Block,
    pub block_old: Option<Block>,
    pub modified_by_id: String,
}
