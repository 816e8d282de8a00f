//! Persistence for the notification subsystem.
//!
//! - [`Store`]: the async storage contract the notification core consumes.
//! - [`PgStore`]: PostgreSQL implementation built on the repositories in
//!   [`repositories`].
//! - [`MemoryStore`]: concurrent in-memory implementation for tests and
//!   local runs without a database.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{BlockHistoryOptions, Store};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Apply the notification tables' migrations.
pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
