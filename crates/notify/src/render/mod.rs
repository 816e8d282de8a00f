//! Turning [`Diff`](crate::diff::Diff) trees into text.
//!
//! - [`markdown`]: bounded character-level text diffs.
//! - [`cleanup`]: the diff cleanup passes behind it.
//! - [`attachment`]: card diffs as structured attachments.
//! - [`templates`]: cached header templates and link helpers.

pub mod attachment;
pub mod cleanup;
pub mod markdown;
pub mod templates;

use serde::Serialize;

pub use attachment::{
    attachments_to_markdown, card_diff_to_attachment, diffs_to_attachments, AttachmentOptions,
};
pub use markdown::{diff2markdown, diff_to_markdown, MarkdownOptions};
pub use templates::{MarkdownHelpers, TemplateHelpers, TemplateRegistry};

/// A chat-style attachment describing one changed card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// Rendered header line.
    pub pretext: String,
    /// Plain-text stand-in for clients that cannot show fields.
    pub fallback: String,
    pub fields: Vec<AttachmentField>,
}

/// One labelled change inside an [`Attachment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl AttachmentField {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: false,
        }
    }
}
