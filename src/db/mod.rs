//! Database initialization and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! The terminal host uses this module to create the SQLx pool backing
//! `PgMessageStore` and to make sure the message schema and its notify
//! trigger exist before a live query is opened.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Initialize the `PostgreSQL` connection pool and run migrations.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}
