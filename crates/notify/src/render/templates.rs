//! Notification header templates and link helpers.
//!
//! [`TemplateRegistry`] compiles liquid templates on first use and caches
//! them by `(name, language)`. Built-in English sources ship for the three
//! card templates; any template may be overridden per registry. A language
//! with no source of its own falls back to [`DEFAULT_LANGUAGE`].
//!
//! [`TemplateHelpers`] lets a delivery channel decide how links, block
//! descriptions and single-line values look without touching the diff code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use boardwatch_core::block::FIELD_DESCRIPTION;
use boardwatch_core::Block;

use crate::error::NotifyError;

pub const ADD_CARD_NOTIFY: &str = "AddCardNotify";
pub const MODIFY_CARD_NOTIFY: &str = "ModifyCardNotify";
pub const DELETE_CARD_NOTIFY: &str = "DeleteCardNotify";

/// Language used when a template has no source for the requested one.
pub const DEFAULT_LANGUAGE: &str = "en";

fn builtin_source(name: &str) -> Option<&'static str> {
    match name {
        ADD_CARD_NOTIFY => Some("@{{ username }} has added the card {{ card_link }}\n"),
        MODIFY_CARD_NOTIFY => Some("###### @{{ username }} has modified {{ card_link }}\n"),
        DELETE_CARD_NOTIFY => Some("@{{ username }} has deleted the card {{ card_link }}\n"),
        _ => None,
    }
}

type TemplateKey = (String, String);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Cache of compiled templates keyed by `(name, language)`.
pub struct TemplateRegistry {
    parser: liquid::Parser,
    overrides: RwLock<HashMap<TemplateKey, String>>,
    cache: RwLock<HashMap<TemplateKey, Arc<liquid::Template>>>,
}

impl TemplateRegistry {
    pub fn new() -> Result<Self, NotifyError> {
        let parser = liquid::ParserBuilder::with_stdlib()
            .build()
            .map_err(|e| NotifyError::Template {
                name: "parser".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            parser,
            overrides: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the source of a template for one language.
    ///
    /// The source is checked immediately; a template that does not parse is
    /// rejected and the previous one stays in place. Every cached language of
    /// `name` is dropped, since any of them may have resolved to the
    /// replaced source through the fallback language.
    pub fn set_template(
        &self,
        name: &str,
        language: &str,
        source: impl Into<String>,
    ) -> Result<(), NotifyError> {
        let source = source.into();
        let compiled = self.compile(name, &source)?;
        let key = (name.to_string(), language.to_string());

        self.overrides
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone(), source);
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.retain(|(cached_name, _), _| cached_name != name);
        cache.insert(key, Arc::new(compiled));
        Ok(())
    }

    /// Fetch a compiled template, compiling and caching it on first use.
    pub fn get(&self, name: &str, language: &str) -> Result<Arc<liquid::Template>, NotifyError> {
        let key = (name.to_string(), language.to_string());
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let source = self.source(name, language)?;
        let compiled = Arc::new(self.compile(name, &source)?);
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key)
            .or_insert_with(|| Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Render a template with the given globals.
    pub fn render(
        &self,
        name: &str,
        language: &str,
        globals: &liquid::Object,
    ) -> Result<String, NotifyError> {
        self.get(name, language)?
            .render(globals)
            .map_err(|e| NotifyError::Template {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Number of compiled templates held.
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn source(&self, name: &str, language: &str) -> Result<String, NotifyError> {
        let overrides = self
            .overrides
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lookup = |lang: &str| overrides.get(&(name.to_string(), lang.to_string())).cloned();

        lookup(language)
            .or_else(|| lookup(DEFAULT_LANGUAGE))
            .or_else(|| builtin_source(name).map(str::to_string))
            .ok_or_else(|| NotifyError::Template {
                name: name.to_string(),
                reason: "no such template".into(),
            })
    }

    fn compile(&self, name: &str, source: &str) -> Result<liquid::Template, NotifyError> {
        self.parser.parse(source).map_err(|e| NotifyError::Template {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Formatting hooks used while rendering attachments.
pub trait TemplateHelpers: Send + Sync {
    /// A link to a card, in the channel's markup.
    fn make_card_link(&self, card: &Block) -> String;

    /// A link to a board, in the channel's markup.
    fn make_board_link(&self, board: &Block) -> String;

    /// The human-readable body of a content block.
    fn description(&self, block: &Block) -> String {
        let description = block.get_string(FIELD_DESCRIPTION);
        if description.is_empty() {
            block.title.clone()
        } else {
            description.to_string()
        }
    }

    /// Flatten a value onto one line.
    fn strip_newlines(&self, text: &str) -> String {
        text.split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Markdown links into the web app at `site_url`.
#[derive(Debug, Clone)]
pub struct MarkdownHelpers {
    site_url: String,
}

impl MarkdownHelpers {
    pub fn new(site_url: impl Into<String>) -> Self {
        let site_url = site_url.into();
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }
}

fn link_title(block: &Block) -> &str {
    if block.title.is_empty() {
        "untitled"
    } else {
        &block.title
    }
}

impl TemplateHelpers for MarkdownHelpers {
    fn make_card_link(&self, card: &Block) -> String {
        format!(
            "[{}]({}/workspace/{}/{}/0/{})",
            link_title(card),
            self.site_url,
            card.workspace_id,
            card.board_id,
            card.id
        )
    }

    fn make_board_link(&self, board: &Block) -> String {
        format!(
            "[{}]({}/workspace/{}/{})",
            link_title(board),
            self.site_url,
            board.workspace_id,
            board.id
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
