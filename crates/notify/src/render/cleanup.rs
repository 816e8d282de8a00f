//! Character diff and post-diff cleanup passes.
//!
//! The raw diff comes from [`similar`] (Myers). The cleanup passes reshape
//! it for human readers:
//!
//! - [`cleanup_semantic`] folds short equalities wedged between larger
//!   edits into those edits.
//! - [`cleanup_efficiency`] folds equalities that cost more to show than to
//!   re-type, given an edit cost.
//! - [`cleanup_merge`] joins neighbouring edits of the same kind and
//!   factors shared prefixes and suffixes out of delete/insert pairs.
//!
//! Lengths are counted in characters, never bytes.

use similar::{ChangeTag, TextDiff};

/// Cost of an edit, in characters, used by [`cleanup_efficiency`].
pub const EDIT_COST: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equal,
    Insert,
    Delete,
}

/// One span of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub op: Op,
    pub text: String,
}

impl Edit {
    pub fn new(op: Op, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
        }
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Character-level diff of `old` into `new`, adjacent changes of the same
/// kind already joined.
pub fn char_diff(old: &str, new: &str) -> Vec<Edit> {
    let diff = TextDiff::from_chars(old, new);
    let mut edits: Vec<Edit> = Vec::new();
    for change in diff.iter_all_changes() {
        let op = match change.tag() {
            ChangeTag::Equal => Op::Equal,
            ChangeTag::Insert => Op::Insert,
            ChangeTag::Delete => Op::Delete,
        };
        match edits.last_mut() {
            Some(last) if last.op == op => last.text.push_str(change.value()),
            _ => edits.push(Edit::new(op, change.value())),
        }
    }
    edits
}

/// Fold equalities no longer than the edits on both sides of them.
pub fn cleanup_semantic(edits: &mut Vec<Edit>) {
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    // Edit lengths before (1) and after (2) the last equality.
    let (mut ins1, mut del1, mut ins2, mut del2) = (0usize, 0usize, 0usize, 0usize);

    let mut pointer = 0;
    while pointer < edits.len() {
        if edits[pointer].op == Op::Equal {
            equalities.push(pointer);
            ins1 = ins2;
            del1 = del2;
            ins2 = 0;
            del2 = 0;
            last_equality = Some(edits[pointer].text.clone());
            pointer += 1;
            continue;
        }

        if edits[pointer].op == Op::Insert {
            ins2 += edits[pointer].len();
        } else {
            del2 += edits[pointer].len();
        }

        let fold = last_equality.as_ref().filter(|eq| {
            let len = eq.chars().count();
            len <= ins1.max(del1) && len <= ins2.max(del2)
        });

        match (fold.cloned(), equalities.last().copied()) {
            (Some(equality), Some(at)) => {
                edits.insert(at, Edit::new(Op::Delete, equality));
                edits[at + 1].op = Op::Insert;
                // The folded equality, then the previous one which must be
                // re-evaluated.
                equalities.pop();
                equalities.pop();
                pointer = equalities.last().map_or(0, |&p| p + 1);
                ins1 = 0;
                del1 = 0;
                ins2 = 0;
                del2 = 0;
                last_equality = None;
                changes = true;
            }
            _ => pointer += 1,
        }
    }

    if changes {
        cleanup_merge(edits);
    }
}

/// Fold short equalities that separate edits, when showing them costs more
/// than `edit_cost` characters of re-typing.
pub fn cleanup_efficiency(edits: &mut Vec<Edit>, edit_cost: usize) {
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    // Whether there is an insert/delete before (pre) and after (post) the
    // last equality.
    let (mut pre_ins, mut pre_del, mut post_ins, mut post_del) = (false, false, false, false);

    let mut pointer = 0;
    while pointer < edits.len() {
        if edits[pointer].op == Op::Equal {
            if edits[pointer].len() < edit_cost && (post_ins || post_del) {
                equalities.push(pointer);
                pre_ins = post_ins;
                pre_del = post_del;
                last_equality = Some(edits[pointer].text.clone());
            } else {
                equalities.clear();
                last_equality = None;
            }
            post_ins = false;
            post_del = false;
            pointer += 1;
            continue;
        }

        if edits[pointer].op == Op::Delete {
            post_del = true;
        } else {
            post_ins = true;
        }

        let sides = [pre_ins, pre_del, post_ins, post_del]
            .iter()
            .filter(|&&s| s)
            .count();
        let fold = last_equality.as_ref().filter(|eq| {
            sides == 4 || (eq.chars().count() < edit_cost / 2 && sides == 3)
        });

        let mut next = pointer + 1;
        if let (Some(equality), Some(&at)) = (fold.cloned(), equalities.last()) {
            edits.insert(at, Edit::new(Op::Delete, equality));
            edits[at + 1].op = Op::Insert;
            equalities.pop();
            last_equality = None;
            if pre_ins && pre_del {
                // No changes made which could affect previous entries.
                post_ins = true;
                post_del = true;
                equalities.clear();
                next = pointer + 2;
            } else {
                equalities.pop();
                next = equalities.last().map_or(0, |&p| p + 1);
                post_ins = false;
                post_del = false;
            }
            changes = true;
        }
        pointer = next;
    }

    if changes {
        cleanup_merge(edits);
    }
}

/// Join neighbouring edits of the same kind, factor common affixes out of
/// delete/insert runs, and slide single edits to absorb their neighbours.
pub fn cleanup_merge(edits: &mut Vec<Edit>) {
    // Sentinel so the final run is flushed.
    edits.push(Edit::new(Op::Equal, ""));

    let mut pointer = 0;
    let (mut count_del, mut count_ins) = (0usize, 0usize);
    let (mut text_del, mut text_ins) = (String::new(), String::new());

    while pointer < edits.len() {
        match edits[pointer].op {
            Op::Insert => {
                count_ins += 1;
                text_ins.push_str(&edits[pointer].text);
                pointer += 1;
            }
            Op::Delete => {
                count_del += 1;
                text_del.push_str(&edits[pointer].text);
                pointer += 1;
            }
            Op::Equal => {
                if count_del + count_ins > 1 {
                    if count_del != 0 && count_ins != 0 {
                        let prefix = common_prefix(&text_ins, &text_del);
                        if prefix != 0 {
                            let start = pointer - count_del - count_ins;
                            let shared = text_ins[..prefix].to_string();
                            if start > 0 && edits[start - 1].op == Op::Equal {
                                edits[start - 1].text.push_str(&shared);
                            } else {
                                edits.insert(0, Edit::new(Op::Equal, shared));
                                pointer += 1;
                            }
                            text_ins.drain(..prefix);
                            text_del.drain(..prefix);
                        }

                        let suffix = common_suffix(&text_ins, &text_del);
                        if suffix != 0 {
                            let shared = text_ins[text_ins.len() - suffix..].to_string();
                            edits[pointer].text.insert_str(0, &shared);
                            text_ins.truncate(text_ins.len() - suffix);
                            text_del.truncate(text_del.len() - suffix);
                        }
                    }

                    let start = pointer - count_del - count_ins;
                    let mut merged = Vec::with_capacity(2);
                    if !text_del.is_empty() {
                        merged.push(Edit::new(Op::Delete, std::mem::take(&mut text_del)));
                    }
                    if !text_ins.is_empty() {
                        merged.push(Edit::new(Op::Insert, std::mem::take(&mut text_ins)));
                    }
                    let added = merged.len();
                    edits.splice(start..pointer, merged);
                    pointer = start + added + 1;
                } else if pointer != 0 && edits[pointer - 1].op == Op::Equal {
                    let text = edits.remove(pointer).text;
                    edits[pointer - 1].text.push_str(&text);
                } else {
                    pointer += 1;
                }
                count_del = 0;
                count_ins = 0;
                text_del.clear();
                text_ins.clear();
            }
        }
    }

    if edits.last().map_or(false, |e| e.text.is_empty()) {
        edits.pop();
    }
    edits.retain(|e| !e.text.is_empty());

    // Second pass: a single edit between two equalities slides over one of
    // them when the edit starts or ends with it, e.g. `A<ins>BA</ins>C`
    // becomes `<ins>AB</ins>AC`.
    let mut changes = false;
    let mut pointer = 1;
    while pointer + 1 < edits.len() {
        if edits[pointer - 1].op == Op::Equal && edits[pointer + 1].op == Op::Equal {
            let prev = edits[pointer - 1].text.clone();
            let next = edits[pointer + 1].text.clone();
            let current = edits[pointer].text.clone();
            if current.ends_with(&prev) {
                edits[pointer].text = format!("{prev}{}", &current[..current.len() - prev.len()]);
                edits[pointer + 1].text = format!("{prev}{next}");
                edits.remove(pointer - 1);
                changes = true;
            } else if current.starts_with(&next) {
                edits[pointer - 1].text.push_str(&next);
                edits[pointer].text = format!("{}{next}", &current[next.len()..]);
                edits.remove(pointer + 1);
                changes = true;
            }
        }
        pointer += 1;
    }

    if changes {
        cleanup_merge(edits);
    }
}

/// Byte length of the longest common prefix, on a char boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Byte length of the longest common suffix, on a char boundary.
fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Reconstruct the old text from a diff.
pub fn source_text(edits: &[Edit]) -> String {
    edits
        .iter()
        .filter(|e| e.op != Op::Insert)
        .map(|e| e.text.as_str())
        .collect()
}

/// Reconstruct the new text from a diff.
pub fn target_text(edits: &[Edit]) -> String {
    edits
        .iter()
        .filter(|e| e.op != Op::Delete)
        .map(|e| e.text.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn e(op: Op, text: &str) -> Edit {
        Edit::new(op, text)
    }

    #[test]
    fn char_diff_preserves_both_sides() {
        let edits = char_diff("The quick fox", "The slow brown fox");
        assert_eq!(source_text(&edits), "The quick fox");
        assert_eq!(target_text(&edits), "The slow brown fox");
    }

    #[test]
    fn merge_joins_same_ops() {
        let mut edits = vec![
            e(Op::Equal, "a"),
            e(Op::Delete, "b"),
            e(Op::Delete, "c"),
            e(Op::Insert, "d"),
            e(Op::Equal, "e"),
            e(Op::Equal, "f"),
        ];
        cleanup_merge(&mut edits);
        assert_eq!(
            edits,
            vec![
                e(Op::Equal, "a"),
                e(Op::Delete, "bc"),
                e(Op::Insert, "d"),
                e(Op::Equal, "ef"),
            ]
        );
    }

    #[test]
    fn merge_factors_common_affixes() {
        let mut edits = vec![e(Op::Delete, "a"), e(Op::Insert, "abc"), e(Op::Delete, "dc")];
        cleanup_merge(&mut edits);
        assert_eq!(
            edits,
            vec![
                e(Op::Equal, "a"),
                e(Op::Delete, "d"),
                e(Op::Insert, "b"),
                e(Op::Equal, "c"),
            ]
        );
    }

    #[test]
    fn merge_slides_edit_left() {
        let mut edits = vec![e(Op::Equal, "a"), e(Op::Insert, "ba"), e(Op::Equal, "c")];
        cleanup_merge(&mut edits);
        assert_eq!(edits, vec![e(Op::Insert, "ab"), e(Op::Equal, "ac")]);
    }

    #[test]
    fn merge_slides_edit_right() {
        let mut edits = vec![e(Op::Equal, "a"), e(Op::Delete, "bc"), e(Op::Equal, "b")];
        cleanup_merge(&mut edits);
        assert_eq!(edits, vec![e(Op::Equal, "ab"), e(Op::Delete, "cb")]);
    }

    #[test]
    fn semantic_folds_small_equality() {
        let mut edits = vec![
            e(Op::Delete, "abc"),
            e(Op::Insert, "1234"),
            e(Op::Equal, "x"),
            e(Op::Delete, "yz"),
            e(Op::Insert, "567"),
        ];
        cleanup_semantic(&mut edits);
        assert_eq!(
            edits,
            vec![e(Op::Delete, "abcxyz"), e(Op::Insert, "1234x567")]
        );
    }

    #[test]
    fn semantic_keeps_large_equality() {
        let mut edits = vec![
            e(Op::Delete, "ab"),
            e(Op::Equal, "cdefgh"),
            e(Op::Insert, "ij"),
        ];
        let expected = edits.clone();
        cleanup_semantic(&mut edits);
        assert_eq!(edits, expected);
    }

    #[test]
    fn efficiency_folds_cheap_equality_between_four_edits() {
        let mut edits = vec![
            e(Op::Delete, "ab"),
            e(Op::Insert, "12"),
            e(Op::Equal, "xyz"),
            e(Op::Delete, "cd"),
            e(Op::Insert, "34"),
        ];
        cleanup_efficiency(&mut edits, EDIT_COST);
        assert_eq!(
            edits,
            vec![e(Op::Delete, "abxyzcd"), e(Op::Insert, "12xyz34")]
        );
    }

    #[test]
    fn efficiency_keeps_long_equality() {
        let mut edits = vec![
            e(Op::Delete, "ab"),
            e(Op::Insert, "12"),
            e(Op::Equal, "wxyz"),
            e(Op::Delete, "cd"),
            e(Op::Insert, "34"),
        ];
        let expected = edits.clone();
        cleanup_efficiency(&mut edits, EDIT_COST);
        assert_eq!(edits, expected);
    }

    #[test]
    fn affixes_respect_char_boundaries() {
        assert_eq!(common_prefix("¶ab", "¶ac"), "¶a".len());
        assert_eq!(common_suffix("x¶", "y¶"), "¶".len());
        assert_eq!(common_prefix("abc", "xyz"), 0);
    }
}
