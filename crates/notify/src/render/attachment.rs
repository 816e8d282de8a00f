//! Card diffs rendered as attachments.
//!
//! Only card diffs become attachments. A created or deleted card renders
//! its header alone; a modified card renders a header plus one field per
//! visible change (title, property values, comments, descriptions).

use std::sync::Arc;

use boardwatch_core::{Block, BlockKind};

use super::markdown::{diff_to_markdown, MarkdownOptions};
use super::templates::{
    TemplateHelpers, TemplateRegistry, ADD_CARD_NOTIFY, DELETE_CARD_NOTIFY, DEFAULT_LANGUAGE,
    MODIFY_CARD_NOTIFY,
};
use super::{Attachment, AttachmentField};
use crate::diff::Diff;
use crate::error::NotifyError;

const TITLE_FIELD: &str = "Title";
const COMMENT_FIELD: &str = "Comment";
const DESCRIPTION_FIELD: &str = "Description";

/// Everything needed to render attachments for one channel.
#[derive(Clone)]
pub struct AttachmentOptions {
    pub registry: Arc<TemplateRegistry>,
    pub helpers: Arc<dyn TemplateHelpers>,
    pub language: String,
    pub markdown: MarkdownOptions,
}

impl AttachmentOptions {
    pub fn new(registry: Arc<TemplateRegistry>, helpers: Arc<dyn TemplateHelpers>) -> Self {
        Self {
            registry,
            helpers,
            language: DEFAULT_LANGUAGE.to_string(),
            markdown: MarkdownOptions::default(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Render one card diff.
///
/// Returns `None` for non-card diffs and for modifications with nothing to
/// show.
pub fn card_diff_to_attachment(
    diff: &Diff,
    opts: &AttachmentOptions,
) -> Result<Option<Attachment>, NotifyError> {
    if diff.block_type != BlockKind::Card {
        return Ok(None);
    }
    let Some(card) = diff.card.as_ref().or(diff.block()) else {
        return Ok(None);
    };

    let globals = template_globals(diff, card, opts);

    if diff.is_create() {
        let pretext = opts.registry.render(ADD_CARD_NOTIFY, &opts.language, &globals)?;
        return Ok(Some(header_only(pretext)));
    }
    if diff.is_delete() {
        let pretext = opts.registry.render(DELETE_CARD_NOTIFY, &opts.language, &globals)?;
        return Ok(Some(header_only(pretext)));
    }

    let fields = modify_fields(diff, opts);
    if fields.is_empty() {
        return Ok(None);
    }

    let pretext = opts.registry.render(MODIFY_CARD_NOTIFY, &opts.language, &globals)?;
    let fallback = pretext.trim_end().to_string();
    Ok(Some(Attachment {
        pretext,
        fallback,
        fields,
    }))
}

/// Render every card diff in `diffs`, skipping the rest.
pub fn diffs_to_attachments(
    diffs: &[Diff],
    opts: &AttachmentOptions,
) -> Result<Vec<Attachment>, NotifyError> {
    let mut attachments = Vec::new();
    for diff in diffs {
        if let Some(attachment) = card_diff_to_attachment(diff, opts)? {
            attachments.push(attachment);
        }
    }
    Ok(attachments)
}

/// Flatten attachments into one markdown message.
pub fn attachments_to_markdown(attachments: &[Attachment]) -> String {
    let mut out = String::new();
    for attachment in attachments {
        out.push_str(attachment.pretext.trim_end());
        out.push('\n');
        for field in &attachment.fields {
            out.push_str(&format!("**{}**: {}\n", field.title, field.value));
        }
    }
    out
}

fn header_only(pretext: String) -> Attachment {
    Attachment {
        fallback: pretext.trim_end().to_string(),
        pretext,
        fields: Vec::new(),
    }
}

fn template_globals(diff: &Diff, card: &Block, opts: &AttachmentOptions) -> liquid::Object {
    let mut globals = liquid::Object::new();
    let mut put = |key: &'static str, value: String| {
        globals.insert(key.into(), liquid::model::Value::scalar(value));
    };

    put("username", diff.username.clone());
    put("card_title", card.title.clone());
    put("card_link", opts.helpers.make_card_link(card));
    match diff.board.as_ref() {
        Some(board) => {
            put("board_title", board.title.clone());
            put("board_link", opts.helpers.make_board_link(board));
        }
        None => {
            put("board_title", String::new());
            put("board_link", String::new());
        }
    }
    globals
}

fn modify_fields(diff: &Diff, opts: &AttachmentOptions) -> Vec<AttachmentField> {
    let helpers = opts.helpers.as_ref();
    let mut fields = Vec::new();

    if let (Some(old), Some(new)) = (diff.old_block.as_ref(), diff.new_block.as_ref()) {
        if old.title != new.title {
            fields.push(AttachmentField::new(
                TITLE_FIELD,
                replaced(&helpers.strip_newlines(&new.title), &helpers.strip_newlines(&old.title)),
            ));
        }
    }

    for prop in &diff.prop_diffs {
        let new_value = helpers.strip_newlines(&prop.new_value);
        let old_value = helpers.strip_newlines(&prop.old_value);
        let value = if old_value.is_empty() {
            new_value
        } else {
            replaced(&new_value, &old_value)
        };
        fields.push(AttachmentField::new(prop.name.clone(), value));
    }

    for child in &diff.diffs {
        if child.block_type == BlockKind::Comment {
            if let Some(field) = comment_field(child, helpers) {
                fields.push(field);
            }
        } else if let Some(field) = description_field(child, opts) {
            fields.push(field);
        }
    }

    fields
}

fn comment_field(child: &Diff, helpers: &dyn TemplateHelpers) -> Option<AttachmentField> {
    if child.is_create() {
        let text = helpers.strip_newlines(&helpers.description(child.new_block.as_ref()?));
        return Some(AttachmentField::new(COMMENT_FIELD, text));
    }
    if child.is_delete() {
        let text = helpers.strip_newlines(&helpers.description(child.old_block.as_ref()?));
        return Some(AttachmentField::new(COMMENT_FIELD, format!("~~`{text}`~~")));
    }
    let old = helpers.strip_newlines(&helpers.description(child.old_block.as_ref()?));
    let new = helpers.strip_newlines(&helpers.description(child.new_block.as_ref()?));
    if old == new {
        return None;
    }
    Some(AttachmentField::new(COMMENT_FIELD, replaced(&new, &old)))
}

fn description_field(child: &Diff, opts: &AttachmentOptions) -> Option<AttachmentField> {
    let helpers = opts.helpers.as_ref();
    let old = child
        .old_block
        .as_ref()
        .map(|b| helpers.description(b))
        .unwrap_or_default();
    let new = if child.is_delete() {
        String::new()
    } else {
        child
            .new_block
            .as_ref()
            .map(|b| helpers.description(b))
            .unwrap_or_default()
    };

    if old == new {
        return None;
    }

    let value = match (old.is_empty(), new.is_empty()) {
        (true, _) => new,
        (false, true) => format!("~~`{}`~~", helpers.strip_newlines(&old)),
        (false, false) => diff_to_markdown(&old, &new, &opts.markdown),
    };
    Some(AttachmentField::new(DESCRIPTION_FIELD, value))
}

/// `new  ~~`old`~~`: the new value followed by the struck-out old one.
fn replaced(new: &str, old: &str) -> String {
    format!("{new}  ~~`{old}`~~")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
