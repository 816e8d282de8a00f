//! Repository for the `notification_hints` table.

use boardwatch_core::{Millis, NotificationHint};
use sqlx::PgPool;

use crate::models::HintRow;

/// Column list for `notification_hints` queries.
const COLUMNS: &str =
    "block_type, block_id, workspace_id, modified_by_id, username, create_at, update_at, notify_at";

/// Provides upsert and consume operations for notification hints.
pub struct NotificationHintRepo;

impl NotificationHintRepo {
    /// Insert a hint or move the schedule of the block's existing hint.
    ///
    /// The unique key is `block_id`; on conflict the original `create_at` is
    /// kept and the modifier, `update_at` and `notify_at` are replaced.
    pub async fn upsert(
        pool: &PgPool,
        hint: &NotificationHint,
        notify_at: Millis,
    ) -> Result<HintRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_hints ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (block_id) DO UPDATE SET \
                 modified_by_id = EXCLUDED.modified_by_id, \
                 username = EXCLUDED.username, \
                 update_at = EXCLUDED.update_at, \
                 notify_at = EXCLUDED.notify_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, HintRow>(&query)
            .bind(hint.block_type.as_str())
            .bind(&hint.block_id)
            .bind(&hint.workspace_id)
            .bind(&hint.modified_by_id)
            .bind(&hint.username)
            .bind(hint.create_at)
            .bind(hint.update_at)
            .bind(notify_at)
            .fetch_one(pool)
            .await
    }

    /// The hint with the earliest `notify_at`, left in place.
    pub async fn peek_next(pool: &PgPool) -> Result<Option<HintRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_hints ORDER BY notify_at ASC LIMIT 1"
        );
        sqlx::query_as::<_, HintRow>(&query)
            .fetch_optional(pool)
            .await
    }

    /// Atomically remove and return the hint with the earliest `notify_at`.
    ///
    /// Rows locked by a concurrent consumer are skipped.
    pub async fn take_next(pool: &PgPool) -> Result<Option<HintRow>, sqlx::Error> {
        let query = format!(
            "DELETE FROM notification_hints \
             WHERE block_id = ( \
                 SELECT block_id FROM notification_hints \
                 ORDER BY notify_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, HintRow>(&query)
            .fetch_optional(pool)
            .await
    }
}
