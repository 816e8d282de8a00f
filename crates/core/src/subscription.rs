//! Subscriptions, subscribers, users and board membership.

use serde::{Deserialize, Serialize};

use crate::block::BlockKind;
use crate::types::Millis;

/// Who is subscribed: a single user or a chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberType {
    User,
    Channel,
}

impl SubscriberType {
    /// String representation for display, logging, and database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
        }
    }

    /// Parse a stored value; anything other than `"channel"` is a user.
    pub fn parse(s: &str) -> Self {
        match s {
            "channel" => Self::Channel,
            _ => Self::User,
        }
    }
}

/// A (block, subscriber) pair.
///
/// At most one active (`delete_at == 0`) subscription exists per
/// `(block_id, subscriber_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub block_type: BlockKind,
    pub block_id: String,
    pub workspace_id: String,
    pub subscriber_type: SubscriberType,
    pub subscriber_id: String,
    /// Last time this subscriber was notified about the block.
    pub notified_at: Millis,
    pub create_at: Millis,
    pub delete_at: Millis,
}

impl Subscription {
    /// A new user subscription to a block, created at `now`.
    pub fn for_user(
        block_type: BlockKind,
        block_id: impl Into<String>,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        now: Millis,
    ) -> Self {
        Self {
            block_type,
            block_id: block_id.into(),
            workspace_id: workspace_id.into(),
            subscriber_type: SubscriberType::User,
            subscriber_id: user_id.into(),
            notified_at: now,
            create_at: now,
            delete_at: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.delete_at == 0
    }
}

/// The recipient side of an active subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub subscriber_type: SubscriberType,
    pub subscriber_id: String,
    pub notified_at: Millis,
}

/// A platform user, as needed for display names and mention resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// A user's membership of a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMember {
    pub board_id: String,
    pub user_id: String,
    pub scheme_admin: bool,
    pub scheme_editor: bool,
    pub scheme_commenter: bool,
    pub scheme_viewer: bool,
}

impl BoardMember {
    /// A read-only member who may comment.
    pub fn commenter(board_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            user_id: user_id.into(),
            scheme_admin: false,
            scheme_editor: false,
            scheme_commenter: true,
            scheme_viewer: true,
        }
    }
}
