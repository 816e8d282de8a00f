//! Text diff rendered as bounded markdown.

use std::sync::LazyLock;

use regex::Regex;

use super::cleanup::{char_diff, cleanup_efficiency, cleanup_merge, cleanup_semantic, Op, EDIT_COST};

/// Stands in for line breaks while diffing so they diff like any glyph.
pub const NEWLINE_SENTINEL: char = '¶';

/// Marker prepended to a truncated span.
pub const ELLIPSIS: &str = "...";

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").expect("valid regex"));
static SPACE_RUNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// Markers and budgets for [`diff_to_markdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownOptions {
    pub insert_open: String,
    pub insert_close: String,
    pub delete_open: String,
    pub delete_close: String,
    /// Characters kept from the tail of an unchanged span.
    pub max_equal: usize,
    /// Characters kept from the tail of an inserted span.
    pub max_insert: usize,
    /// Characters kept from the tail of a deleted span.
    pub max_delete: usize,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            insert_open: "`".into(),
            insert_close: "`".into(),
            delete_open: "~~`".into(),
            delete_close: "`~~".into(),
            max_equal: 60,
            max_insert: 1024,
            max_delete: 60,
        }
    }
}

/// Render the changes from `old` to `new` as markdown.
///
/// Whitespace is normalised first, so changes to blank lines or space runs
/// alone produce no markers. Every span is cut to its budget from the front,
/// keeping its tail, and prefixed with `...` when cut.
pub fn diff_to_markdown(old: &str, new: &str, opts: &MarkdownOptions) -> String {
    let old = normalize(old);
    let new = normalize(new);

    let mut edits = char_diff(&old, &new);
    cleanup_semantic(&mut edits);
    cleanup_efficiency(&mut edits, EDIT_COST);
    cleanup_merge(&mut edits);

    let mut out = String::new();
    let mut span = String::new();
    let mut span_op: Option<Op> = None;

    for edit in edits {
        if span_op != Some(edit.op) {
            if let Some(op) = span_op {
                flush_span(&mut out, op, &span, opts);
            }
            span.clear();
            span_op = Some(edit.op);
        }
        span.push_str(&edit.text);
    }
    if let Some(op) = span_op {
        flush_span(&mut out, op, &span, opts);
    }

    out.replace(NEWLINE_SENTINEL, "\n")
}

/// [`diff_to_markdown`] with the default markers and budgets.
pub fn diff2markdown(old: &str, new: &str) -> String {
    diff_to_markdown(old, new, &MarkdownOptions::default())
}

fn flush_span(out: &mut String, op: Op, text: &str, opts: &MarkdownOptions) {
    if text.is_empty() {
        return;
    }
    match op {
        Op::Equal => out.push_str(&truncate_tail(text, opts.max_equal)),
        Op::Insert => {
            out.push_str(&opts.insert_open);
            out.push_str(&truncate_tail(text, opts.max_insert));
            out.push_str(&opts.insert_close);
        }
        Op::Delete => {
            out.push_str(&opts.delete_open);
            out.push_str(&truncate_tail(text, opts.max_delete));
            out.push_str(&opts.delete_close);
        }
    }
}

/// Keep the last `max` characters of `text`, prefixed with `...` when
/// anything was cut.
pub fn truncate_tail(text: &str, max: usize) -> String {
    let len = text.chars().count();
    if len <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(len - max).collect();
    format!("{ELLIPSIS}{tail}")
}

/// Collapse blank lines, turn line breaks into the sentinel and collapse
/// runs of spaces and tabs.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = BLANK_LINES_RE.replace_all(&text, "\n");
    let text = text.replace('\n', &NEWLINE_SENTINEL.to_string());
    SPACE_RUNS_RE.replace_all(&text, " ").into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
