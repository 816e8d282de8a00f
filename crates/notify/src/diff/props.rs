//! Property value and property schema comparison.

use std::collections::BTreeSet;

use boardwatch_core::schema::parse_property_schema;
use boardwatch_core::{Block, CoreError, PropSchema};
use serde_json::Value;

use super::{PropDiff, SchemaDiff};

/// Compare the custom property values of two versions of a card.
///
/// Values are resolved to display strings through `schema`. Properties the
/// board does not declare are skipped. The result is in schema order.
pub fn prop_diffs(schema: &PropSchema, old: Option<&Block>, new: Option<&Block>) -> Vec<PropDiff> {
    let old_props = old.map(Block::properties).unwrap_or_default();
    let new_props = new.map(Block::properties).unwrap_or_default();

    let ids: BTreeSet<&String> = old_props.keys().chain(new_props.keys()).collect();

    let mut diffs: Vec<PropDiff> = ids
        .into_iter()
        .filter_map(|id| {
            let old_raw = old_props.get(id).unwrap_or(&Value::Null);
            let new_raw = new_props.get(id).unwrap_or(&Value::Null);
            if old_raw == new_raw {
                return None;
            }
            let (index, def) = schema.get(id)?;
            let old_value = def.display_value(old_raw);
            let new_value = def.display_value(new_raw);
            if old_value == new_value {
                return None;
            }
            Some(PropDiff {
                id: id.clone(),
                index,
                name: def.name.clone(),
                old_value,
                new_value,
            })
        })
        .collect();

    diffs.sort_by_key(|d| d.index);
    diffs
}

/// Compare the property definitions of two versions of a board.
///
/// Added and renamed properties come first in the new board's order, then
/// removed ones in the old board's order.
pub fn schema_diffs(old: Option<&Block>, new: &Block) -> Result<Vec<SchemaDiff>, CoreError> {
    let new_schema = parse_property_schema(new)?;
    let old_schema = match old {
        Some(old) => parse_property_schema(old)?,
        None => PropSchema::default(),
    };

    let mut diffs = Vec::new();

    for def in new_schema.defs() {
        match old_schema.get(&def.id) {
            None => diffs.push(SchemaDiff::Added {
                id: def.id.clone(),
                name: def.name.clone(),
            }),
            Some((_, previous)) if previous.name != def.name => diffs.push(SchemaDiff::Renamed {
                id: def.id.clone(),
                old_name: previous.name.clone(),
                new_name: def.name.clone(),
            }),
            Some(_) => {}
        }
    }

    for def in old_schema.defs() {
        if new_schema.get(&def.id).is_none() {
            diffs.push(SchemaDiff::Removed {
                id: def.id.clone(),
                name: def.name.clone(),
            });
        }
    }

    Ok(diffs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
