//! Read-only repository for the `blocks` and `blocks_history` tables.
//!
//! Both tables are owned by the application layer; this crate only reads
//! them.

use sqlx::PgPool;

use crate::models::BlockRow;
use crate::store::BlockHistoryOptions;

/// Column list shared by `blocks` and `blocks_history` queries, minus
/// `insert_at` which only exists on history rows.
const BASE_COLUMNS: &str = "id, parent_id, board_id, workspace_id, created_by, modified_by, \
     type, title, fields, create_at, update_at, delete_at";

/// Provides block and block-history lookups.
pub struct BlockRepo;

impl BlockRepo {
    /// Find a live block by id.
    pub async fn find_by_id(pool: &PgPool, block_id: &str) -> Result<Option<BlockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {BASE_COLUMNS}, 0::BIGINT AS insert_at FROM blocks WHERE id = $1"
        );
        sqlx::query_as::<_, BlockRow>(&query)
            .bind(block_id)
            .fetch_optional(pool)
            .await
    }

    /// History rows of a single block, filtered and ordered by insertion
    /// time.
    pub async fn history(
        pool: &PgPool,
        block_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<BlockRow>, sqlx::Error> {
        let order = order_clause(opts);
        let query = format!(
            "SELECT {BASE_COLUMNS}, insert_at FROM blocks_history \
             WHERE id = $1 AND insert_at > $2 AND insert_at < $3 \
             ORDER BY {order} \
             LIMIT $4"
        );
        sqlx::query_as::<_, BlockRow>(&query)
            .bind(block_id)
            .bind(opts.after_insert_at.unwrap_or(i64::MIN))
            .bind(opts.before_insert_at.unwrap_or(i64::MAX))
            .bind(limit_value(opts))
            .fetch_all(pool)
            .await
    }

    /// History rows of a block and its direct children.
    pub async fn sub_tree_history(
        pool: &PgPool,
        root_id: &str,
        opts: &BlockHistoryOptions,
    ) -> Result<Vec<BlockRow>, sqlx::Error> {
        let order = order_clause(opts);
        let query = format!(
            "SELECT {BASE_COLUMNS}, insert_at FROM blocks_history \
             WHERE (id = $1 OR parent_id = $1) AND insert_at > $2 AND insert_at < $3 \
             ORDER BY {order} \
             LIMIT $4"
        );
        sqlx::query_as::<_, BlockRow>(&query)
            .bind(root_id)
            .bind(opts.after_insert_at.unwrap_or(i64::MIN))
            .bind(opts.before_insert_at.unwrap_or(i64::MAX))
            .bind(limit_value(opts))
            .fetch_all(pool)
            .await
    }
}

fn order_clause(opts: &BlockHistoryOptions) -> &'static str {
    if opts.descending {
        "insert_at DESC, update_at DESC"
    } else {
        "insert_at ASC, update_at ASC"
    }
}

fn limit_value(opts: &BlockHistoryOptions) -> i64 {
    opts.limit
        .and_then(|l| i64::try_from(l).ok())
        .unwrap_or(i64::MAX)
}
