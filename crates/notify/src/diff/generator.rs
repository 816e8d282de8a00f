//! Builds [`Diff`] trees from block history.
//!
//! A generator works on one [`NotificationHint`] and one cutoff time: every
//! history row inserted after `last_notify_at` belongs to the window being
//! reported. Rows are always ordered by insertion time.
//!
//! A block that already existed at the cutoff and was written once inside
//! the window is compared against the version it had at the cutoff.

use std::collections::HashMap;
use std::sync::Arc;

use boardwatch_core::schema::parse_property_schema;
use boardwatch_core::{Block, BlockKind, Millis, NotificationHint, PropSchema};
use boardwatch_db::{BlockHistoryOptions, Store, StoreError};

use super::props::{prop_diffs, schema_diffs};
use super::{version_time, Diff};
use crate::error::NotifyError;

/// Context shared by every diff built for one hint.
struct DiffContext {
    board: Block,
    card: Option<Block>,
    username: String,
    schema: PropSchema,
}

/// Generates the diffs for one notification hint.
pub struct DiffGenerator {
    store: Arc<dyn Store>,
    hint: NotificationHint,
    last_notify_at: Millis,
}

impl DiffGenerator {
    /// `last_notify_at` is the start of the reporting window, normally the
    /// oldest `notified_at` among the block's subscribers.
    pub fn new(store: Arc<dyn Store>, hint: NotificationHint, last_notify_at: Millis) -> Self {
        Self {
            store,
            hint,
            last_notify_at,
        }
    }

    /// Build the diffs for the hint's block.
    ///
    /// An empty result means nothing observable changed in the window.
    pub async fn generate_diffs(&self) -> Result<Vec<Diff>, NotifyError> {
        let block_id = self.hint.block_id.as_str();

        let block = self
            .store
            .get_block_or_latest(block_id)
            .await
            .map_err(|e| lookup_error(format!("get block {block_id}"), e))?;

        let (board, card) = self
            .store
            .get_board_and_card(&block)
            .await
            .map_err(|e| lookup_error(format!("resolve board and card of {block_id}"), e))?;

        let username = self.resolve_username().await;
        let schema = parse_property_schema(&board)?;

        let ctx = DiffContext {
            board,
            card,
            username,
            schema,
        };

        match block.kind {
            BlockKind::Board => self.board_diffs(&ctx).await,
            BlockKind::Card => {
                let diff = self.card_diff(&ctx, &block).await?;
                Ok(diff.into_iter().collect())
            }
            _ => {
                let diff = self.block_diff(&ctx, &block).await?;
                Ok(diff.into_iter().collect())
            }
        }
    }

    /// Display name of the user behind the hint, falling back to the name
    /// stored on the hint and then to the raw id.
    async fn resolve_username(&self) -> String {
        match self.store.get_user_by_id(&self.hint.modified_by_id).await {
            Ok(user) if !user.username.is_empty() => user.username,
            Ok(_) => self.fallback_username(),
            Err(e) => {
                tracing::debug!(
                    user_id = %self.hint.modified_by_id,
                    error = %e,
                    "Could not resolve modifier, using fallback name"
                );
                self.fallback_username()
            }
        }
    }

    fn fallback_username(&self) -> String {
        if self.hint.username.is_empty() {
            self.hint.modified_by_id.clone()
        } else {
            self.hint.username.clone()
        }
    }

    fn window(&self) -> BlockHistoryOptions {
        BlockHistoryOptions::after(self.last_notify_at)
    }

    fn contextualize(&self, ctx: &DiffContext, mut diff: Diff, card: Option<&Block>) -> Diff {
        diff.board = Some(ctx.board.clone());
        diff.card = card.cloned();
        diff.username = ctx.username.clone();
        diff
    }

    // -----------------------------------------------------------------------
    // Board
    // -----------------------------------------------------------------------

    /// The board's own diff followed by one diff per card changed in the
    /// window.
    async fn board_diffs(&self, ctx: &DiffContext) -> Result<Vec<Diff>, NotifyError> {
        let board_id = ctx.board.id.as_str();
        let rows = self
            .store
            .get_sub_tree2_from_history(board_id, &self.window())
            .await
            .map_err(|e| lookup_error(format!("get history of board {board_id}"), e))?;

        let grouped = group_by_block(rows);
        let mut diffs = Vec::new();

        if let Some((_, board_rows)) = grouped.iter().find(|(id, _)| id == board_id) {
            if let Some(mut diff) = self.window_diff(board_rows).await? {
                diff.schema_diffs = match diff.new_block.as_ref() {
                    Some(new) => schema_diffs(diff.old_block.as_ref(), new)?,
                    None => Vec::new(),
                };
                diffs.push(self.contextualize(ctx, diff, None));
            }
        }

        for (id, card_rows) in &grouped {
            let is_card = card_rows.last().map_or(false, |b| b.kind == BlockKind::Card);
            if id == board_id || !is_card {
                continue;
            }
            let Some(card) = card_rows.last() else {
                continue;
            };
            if let Some(diff) = self.card_diff(ctx, card).await? {
                diffs.push(diff);
            }
        }

        Ok(diffs)
    }

    // -----------------------------------------------------------------------
    // Card
    // -----------------------------------------------------------------------

    /// The card's diff with one child per content block or comment changed
    /// in the window.
    ///
    /// When only children changed, the card diff carries the current card
    /// as both old and new block.
    async fn card_diff(&self, ctx: &DiffContext, card: &Block) -> Result<Option<Diff>, NotifyError> {
        let card_id = card.id.as_str();
        let rows = self
            .store
            .get_sub_tree2_from_history(card_id, &self.window())
            .await
            .map_err(|e| lookup_error(format!("get history of card {card_id}"), e))?;

        let grouped = group_by_block(rows);

        let mut own = None;
        let mut children = Vec::new();
        for (id, rows) in &grouped {
            if id == card_id {
                own = self.window_diff(rows).await?;
                continue;
            }
            let is_child = rows
                .last()
                .map_or(false, |b| b.kind.is_content() || b.kind == BlockKind::Comment);
            if !is_child {
                continue;
            }
            if let Some(diff) = self.window_diff(rows).await? {
                children.push(self.contextualize(ctx, diff, Some(card)));
            }
        }

        if own.is_none() && children.is_empty() {
            return Ok(None);
        }

        let mut diff = match own {
            Some(diff) => diff,
            None => {
                let mut diff = Diff::new(BlockKind::Card, Some(card.clone()), Some(card.clone()));
                diff.update_at = children.iter().map(|c| c.update_at).max().unwrap_or_default();
                diff
            }
        };
        diff.prop_diffs = prop_diffs(&ctx.schema, diff.old_block.as_ref(), diff.new_block.as_ref());
        let card_block = diff.block().cloned();
        let mut diff = self.contextualize(ctx, diff, card_block.as_ref());

        children.sort_by_key(|c| c.update_at);
        for child in children {
            diff.push_child(child)?;
        }
        diff.update_at = diff
            .update_at
            .max(diff.diffs.iter().map(|c| c.update_at).max().unwrap_or_default());

        Ok(Some(diff))
    }

    // -----------------------------------------------------------------------
    // Other blocks
    // -----------------------------------------------------------------------

    async fn block_diff(&self, ctx: &DiffContext, block: &Block) -> Result<Option<Diff>, NotifyError> {
        let block_id = block.id.as_str();
        let rows = self
            .store
            .get_block_history(block_id, &self.window())
            .await
            .map_err(|e| lookup_error(format!("get history of block {block_id}"), e))?;

        Ok(self
            .window_diff(&rows)
            .await?
            .map(|diff| self.contextualize(ctx, diff, ctx.card.as_ref())))
    }

    /// Diff one block's rows in the window, reaching back to the version it
    /// had at the cutoff when the window holds a single write to a block
    /// that already existed.
    async fn window_diff(&self, rows: &[Block]) -> Result<Option<Diff>, NotifyError> {
        if let [only] = rows {
            if only.create_at <= self.last_notify_at {
                let baseline = self
                    .store
                    .get_block_version_at(&only.id, self.last_notify_at)
                    .await
                    .map_err(|e| {
                        lookup_error(format!("get version of {} at cutoff", only.id), e)
                    })?;
                if let Some(baseline) = baseline {
                    return Ok(diff_from_history(&[baseline, only.clone()], self.last_notify_at));
                }
            }
        }
        Ok(diff_from_history(rows, self.last_notify_at))
    }
}

// ---------------------------------------------------------------------------
// History helpers
// ---------------------------------------------------------------------------

/// Diff one block from its history rows in the window, oldest first.
///
/// - A block created inside the window is a create (`old_block = None`),
///   unless it was also deleted inside the window, which yields nothing.
/// - Otherwise fewer than two rows yield nothing, and the oldest and newest
///   rows become the old and new block.
/// - A modification with no observable difference yields nothing.
pub fn diff_from_history(rows: &[Block], cutoff: Millis) -> Option<Diff> {
    let newest = rows.last()?;

    if newest.create_at > cutoff {
        if newest.is_deleted() {
            return None;
        }
        return Some(Diff::new(newest.kind.clone(), None, Some(newest.clone())));
    }

    if rows.len() < 2 {
        return None;
    }
    let oldest = rows.first()?;
    if !oldest.observably_differs(newest) {
        return None;
    }

    let mut diff = Diff::new(newest.kind.clone(), Some(oldest.clone()), Some(newest.clone()));
    diff.update_at = version_time(newest);
    Some(diff)
}

/// Group history rows by block id, keeping first-seen order of blocks and
/// the input order of rows.
fn group_by_block(rows: Vec<Block>) -> Vec<(String, Vec<Block>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Block>)> = Vec::new();
    for row in rows {
        match index.get(&row.id) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(row.id.clone(), groups.len());
                groups.push((row.id.clone(), vec![row]));
            }
        }
    }
    groups
}

/// Turn a store miss into [`NotifyError::NotFound`], anything else into a
/// contextual store error.
fn lookup_error(context: String, err: StoreError) -> NotifyError {
    match err {
        StoreError::NotFound { entity, id } => NotifyError::NotFound { entity, id },
        other => NotifyError::store(context, other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
