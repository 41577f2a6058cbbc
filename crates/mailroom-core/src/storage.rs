//! SQLite pool construction shared by the repositories.
//!
//! The stores each create their own tables but can share one database,
//! which the mail queries rely on when they join the labels table.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::Result;

/// Opens the backing database, creating the file if it does not exist.
///
/// # Errors
///
/// Returns an error if the database connection fails.
pub async fn connect(database_path: &str) -> Result<SqlitePool> {
    let url = format!("sqlite:{database_path}?mode=rwc");
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;
    Ok(pool)
}

/// Opens a private in-memory database, for testing.
///
/// A single connection keeps every handle on the same database.
///
/// # Errors
///
/// Returns an error if the database connection fails.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
