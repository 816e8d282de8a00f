//! Content blocks.
//!
//! Everything on a board is a [`Block`]: the board itself, its cards, and the
//! text/comment/checkbox blocks that make up a card's content. Blocks carry a
//! schemaless JSON `fields` document whose shape depends on the block kind.
//! Accessors on [`Block`] are fail-soft: a missing key or a value of the
//! wrong JSON type yields an empty default rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Millis;

/// Key under which a card stores its custom property values.
pub const FIELD_PROPERTIES: &str = "properties";

/// Key under which a board stores its custom property definitions.
pub const FIELD_CARD_PROPERTIES: &str = "cardProperties";

/// Key under which a board stores its description.
pub const FIELD_DESCRIPTION: &str = "description";

// ---------------------------------------------------------------------------
// BlockKind
// ---------------------------------------------------------------------------

/// The kind of a block, stored as a lowercase string (`"card"`, `"text"`, ...).
///
/// Unknown kinds are preserved verbatim in [`BlockKind::Other`] so that rows
/// written by newer clients still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    Board,
    Card,
    Text,
    Image,
    Checkbox,
    Divider,
    Comment,
    Other(String),
}

impl BlockKind {
    /// String representation for display, logging, and database storage.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Board => "board",
            Self::Card => "card",
            Self::Text => "text",
            Self::Image => "image",
            Self::Checkbox => "checkbox",
            Self::Divider => "divider",
            Self::Comment => "comment",
            Self::Other(s) => s,
        }
    }

    /// Parse a stored kind string. Never fails; unknown values map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "board" => Self::Board,
            "card" => Self::Card,
            "text" => Self::Text,
            "image" => Self::Image,
            "checkbox" => Self::Checkbox,
            "divider" => Self::Divider,
            "comment" => Self::Comment,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this kind is part of a card's content (everything below a card
    /// except comments).
    pub fn is_content(&self) -> bool {
        !matches!(self, Self::Board | Self::Card | Self::Comment)
    }
}

impl From<String> for BlockKind {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<BlockKind> for String {
    fn from(kind: BlockKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A single block, either the live row or one row of its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    /// Parent block id; empty for boards.
    #[serde(default)]
    pub parent_id: String,
    /// Id of the board this block belongs to (a board's own id for boards).
    pub board_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub create_at: Millis,
    pub update_at: Millis,
    #[serde(default)]
    pub delete_at: Millis,
    /// When this history row was inserted. Zero for rows that did not come
    /// from the history table.
    #[serde(default)]
    pub insert_at: Millis,
}

impl Block {
    /// Whether the block has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }

    /// Fetch a string field, or `""` if missing or not a string.
    pub fn get_string(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Fetch a string-array field. Non-string elements are skipped; a missing
    /// or non-array value yields an empty vector.
    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        string_slice(self.fields.get(key))
    }

    /// Fetch an object field, or `None` if missing or not an object.
    pub fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.fields.get(key).and_then(Value::as_object)
    }

    /// The card's custom property values keyed by property id.
    pub fn properties(&self) -> Map<String, Value> {
        self.get_object(FIELD_PROPERTIES).cloned().unwrap_or_default()
    }

    /// Whether any user-observable part of the block differs from `other`.
    ///
    /// Timestamps and modifier ids are bookkeeping and are ignored.
    pub fn observably_differs(&self, other: &Block) -> bool {
        self.title != other.title
            || self.fields != other.fields
            || self.is_deleted() != other.is_deleted()
    }
}

/// Read a JSON value as a list of strings, failing soft.
///
/// A single string is treated as a one-element list.
pub fn string_slice(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
