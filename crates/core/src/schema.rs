//! Board property schema.
//!
//! A board declares its cards' custom properties in the `cardProperties`
//! field: an ordered list of definitions, each with an id, a display name, a
//! type, and (for select types) a list of options. Cards store raw values
//! keyed by property id; select values are option ids and must be resolved
//! through the schema before they mean anything to a reader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::{string_slice, Block, FIELD_CARD_PROPERTIES};
use crate::error::CoreError;

/// Property type whose value is a single option id.
pub const PROP_TYPE_SELECT: &str = "select";

/// Property type whose value is a list of option ids.
pub const PROP_TYPE_MULTI_SELECT: &str = "multiSelect";

/// One selectable option of a select/multi-select property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropOption {
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub color: String,
}

/// A single custom property definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub options: Vec<PropOption>,
}

impl PropDef {
    /// Resolve a raw card value to what a reader would see.
    ///
    /// Select and multi-select values are option ids; unknown ids are shown
    /// as-is. Multiple values are joined with `", "`.
    pub fn display_value(&self, raw: &Value) -> String {
        match self.kind.as_str() {
            PROP_TYPE_SELECT | PROP_TYPE_MULTI_SELECT => string_slice(Some(raw))
                .iter()
                .map(|id| self.option_value(id).unwrap_or(id).to_string())
                .collect::<Vec<_>>()
                .join(", "),
            _ => raw_display(raw),
        }
    }

    fn option_value(&self, option_id: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.id == option_id)
            .map(|o| o.value.as_str())
    }
}

/// A board's ordered property definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropSchema {
    defs: Vec<PropDef>,
}

impl PropSchema {
    pub fn new(defs: Vec<PropDef>) -> Self {
        Self { defs }
    }

    /// Definitions in board order.
    pub fn defs(&self) -> &[PropDef] {
        &self.defs
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Look up a definition and its position in the board's order.
    pub fn get(&self, prop_id: &str) -> Option<(usize, &PropDef)> {
        self.defs.iter().enumerate().find(|(_, d)| d.id == prop_id)
    }

    /// Display value for a raw card value, falling back to the raw value when
    /// the property is not declared by the board.
    pub fn display_value(&self, prop_id: &str, raw: &Value) -> String {
        match self.get(prop_id) {
            Some((_, def)) => def.display_value(raw),
            None => raw_display(raw),
        }
    }
}

/// Parse the property schema embedded in a board block.
///
/// A board without `cardProperties` (or with `null`) has an empty schema.
/// Anything present but structurally wrong is an
/// [`CoreError::InvalidPropSchema`].
pub fn parse_property_schema(board: &Block) -> Result<PropSchema, CoreError> {
    let raw = match board.fields.get(FIELD_CARD_PROPERTIES) {
        None | Some(Value::Null) => return Ok(PropSchema::default()),
        Some(raw) => raw,
    };

    let defs: Vec<PropDef> =
        serde_json::from_value(raw.clone()).map_err(|e| CoreError::InvalidPropSchema {
            board_id: board.id.clone(),
            reason: e.to_string(),
        })?;

    Ok(PropSchema::new(defs))
}

fn raw_display(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(_) => string_slice(Some(raw)).join(", "),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
