//! Repository for the `users` and `board_members` tables.

use boardwatch_core::BoardMember;
use sqlx::PgPool;

use crate::models::{BoardMemberRow, UserRow};

/// Column list for `board_members` queries.
const MEMBER_COLUMNS: &str =
    "board_id, user_id, scheme_admin, scheme_editor, scheme_commenter, scheme_viewer";

/// Provides user lookups and board membership writes.
pub struct UserRepo;

impl UserRepo {
    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>("SELECT id, username, email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive username lookup.
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email FROM users WHERE LOWER(username) = LOWER($1)",
        )
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_member(
        pool: &PgPool,
        board_id: &str,
        user_id: &str,
    ) -> Result<Option<BoardMemberRow>, sqlx::Error> {
        let query = format!(
            "SELECT {MEMBER_COLUMNS} FROM board_members WHERE board_id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, BoardMemberRow>(&query)
            .bind(board_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace a board membership.
    pub async fn save_member(
        pool: &PgPool,
        member: &BoardMember,
    ) -> Result<BoardMemberRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO board_members ({MEMBER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (board_id, user_id) DO UPDATE SET \
                 scheme_admin = EXCLUDED.scheme_admin, \
                 scheme_editor = EXCLUDED.scheme_editor, \
                 scheme_commenter = EXCLUDED.scheme_commenter, \
                 scheme_viewer = EXCLUDED.scheme_viewer \
             RETURNING {MEMBER_COLUMNS}"
        );
        sqlx::query_as::<_, BoardMemberRow>(&query)
            .bind(&member.board_id)
            .bind(&member.user_id)
            .bind(member.scheme_admin)
            .bind(member.scheme_editor)
            .bind(member.scheme_commenter)
            .bind(member.scheme_viewer)
            .fetch_one(pool)
            .await
    }
}
