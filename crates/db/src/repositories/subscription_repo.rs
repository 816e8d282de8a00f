//! Repository for the `subscriptions` table.

use boardwatch_core::{Millis, Subscription};
use sqlx::PgPool;

use crate::models::{SubscriberRow, SubscriptionRow};

/// Column list for `subscriptions` queries.
const COLUMNS: &str = "block_type, block_id, workspace_id, subscriber_type, subscriber_id, \
     notified_at, create_at, delete_at";

/// Provides subscription reads and the few writes the notifier performs.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Create a subscription, re-activating a soft-deleted one for the same
    /// `(block_id, subscriber_id)`.
    pub async fn create(
        pool: &PgPool,
        sub: &Subscription,
    ) -> Result<SubscriptionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO subscriptions ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0) \
             ON CONFLICT (block_id, subscriber_id) DO UPDATE SET \
                 subscriber_type = EXCLUDED.subscriber_type, \
                 notified_at = EXCLUDED.notified_at, \
                 delete_at = 0 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(sub.block_type.as_str())
            .bind(&sub.block_id)
            .bind(&sub.workspace_id)
            .bind(sub.subscriber_type.as_str())
            .bind(&sub.subscriber_id)
            .bind(sub.notified_at)
            .bind(sub.create_at)
            .fetch_one(pool)
            .await
    }

    /// Active subscribers of a block, least recently notified first.
    pub async fn list_subscribers(
        pool: &PgPool,
        block_id: &str,
    ) -> Result<Vec<SubscriberRow>, sqlx::Error> {
        sqlx::query_as::<_, SubscriberRow>(
            "SELECT subscriber_type, subscriber_id, notified_at FROM subscriptions \
             WHERE block_id = $1 AND delete_at = 0 \
             ORDER BY notified_at ASC, subscriber_id ASC",
        )
        .bind(block_id)
        .fetch_all(pool)
        .await
    }

    /// Number of active subscribers of a block.
    pub async fn count_subscribers(pool: &PgPool, block_id: &str) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE block_id = $1 AND delete_at = 0",
        )
        .bind(block_id)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Stamp every active subscription of a block as notified at `notified_at`.
    pub async fn mark_notified(
        pool: &PgPool,
        block_id: &str,
        notified_at: Millis,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriptions SET notified_at = $2 \
             WHERE block_id = $1 AND delete_at = 0",
        )
        .bind(block_id)
        .bind(notified_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Stamp one active subscription of a block as notified at `notified_at`.
    pub async fn mark_subscriber_notified(
        pool: &PgPool,
        block_id: &str,
        subscriber_id: &str,
        notified_at: Millis,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriptions SET notified_at = $3 \
             WHERE block_id = $1 AND subscriber_id = $2 AND delete_at = 0",
        )
        .bind(block_id)
        .bind(subscriber_id)
        .bind(notified_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
