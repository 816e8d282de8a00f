//! Row types for the tables this crate reads and writes.
//!
//! Rows map 1:1 to query results; conversions into the domain types live
//! here so repositories stay thin.

use boardwatch_core::{
    Block, BlockKind, BoardMember, Millis, NotificationHint, Subscriber, SubscriberType,
    Subscription, User,
};
use sqlx::FromRow;

/// A row from `blocks` or `blocks_history`.
#[derive(Debug, Clone, FromRow)]
pub struct BlockRow {
    pub id: String,
    pub parent_id: String,
    pub board_id: String,
    pub workspace_id: String,
    pub created_by: String,
    pub modified_by: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub title: String,
    pub fields: serde_json::Value,
    pub create_at: Millis,
    pub update_at: Millis,
    pub delete_at: Millis,
    pub insert_at: Millis,
}

impl From<BlockRow> for Block {
    fn from(row: BlockRow) -> Self {
        Block {
            id: row.id,
            parent_id: row.parent_id,
            board_id: row.board_id,
            workspace_id: row.workspace_id,
            created_by: row.created_by,
            modified_by: row.modified_by,
            kind: BlockKind::parse(&row.kind),
            title: row.title,
            fields: match row.fields {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            create_at: row.create_at,
            update_at: row.update_at,
            delete_at: row.delete_at,
            insert_at: row.insert_at,
        }
    }
}

/// A row from `notification_hints`.
#[derive(Debug, Clone, FromRow)]
pub struct HintRow {
    pub block_type: String,
    pub block_id: String,
    pub workspace_id: String,
    pub modified_by_id: String,
    pub username: String,
    pub create_at: Millis,
    pub update_at: Millis,
    pub notify_at: Millis,
}

impl From<HintRow> for NotificationHint {
    fn from(row: HintRow) -> Self {
        NotificationHint {
            block_type: BlockKind::parse(&row.block_type),
            block_id: row.block_id,
            workspace_id: row.workspace_id,
            modified_by_id: row.modified_by_id,
            username: row.username,
            create_at: row.create_at,
            update_at: row.update_at,
            notify_at: row.notify_at,
        }
    }
}

/// A row from `subscriptions`.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub block_type: String,
    pub block_id: String,
    pub workspace_id: String,
    pub subscriber_type: String,
    pub subscriber_id: String,
    pub notified_at: Millis,
    pub create_at: Millis,
    pub delete_at: Millis,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            block_type: BlockKind::parse(&row.block_type),
            block_id: row.block_id,
            workspace_id: row.workspace_id,
            subscriber_type: SubscriberType::parse(&row.subscriber_type),
            subscriber_id: row.subscriber_id,
            notified_at: row.notified_at,
            create_at: row.create_at,
            delete_at: row.delete_at,
        }
    }
}

/// The subscriber projection of a `subscriptions` row.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriberRow {
    pub subscriber_type: String,
    pub subscriber_id: String,
    pub notified_at: Millis,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        Subscriber {
            subscriber_type: SubscriberType::parse(&row.subscriber_type),
            subscriber_id: row.subscriber_id,
            notified_at: row.notified_at,
        }
    }
}

/// A row from `users`.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
        }
    }
}

/// A row from `board_members`.
#[derive(Debug, Clone, FromRow)]
pub struct BoardMemberRow {
    pub board_id: String,
    pub user_id: String,
    pub scheme_admin: bool,
    pub scheme_editor: bool,
    pub scheme_commenter: bool,
    pub scheme_viewer: bool,
}

impl From<BoardMemberRow> for BoardMember {
    fn from(row: BoardMemberRow) -> Self {
        BoardMember {
            board_id: row.board_id,
            user_id: row.user_id,
            scheme_admin: row.scheme_admin,
            scheme_editor: row.scheme_editor,
            scheme_commenter: row.scheme_commenter,
            scheme_viewer: row.scheme_viewer,
        }
    }
}
