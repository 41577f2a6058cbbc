//! Authoritative blacklist storage.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::model::BlacklistEntry;
use crate::{Result, storage};

/// Repository for the authoritative blacklist set.
///
/// This store is the source of truth. The remote bloom filter in front
/// of it only accelerates the common "not blacklisted" answer.
pub struct BlacklistStore {
    pool: SqlitePool,
}

impl BlacklistStore {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let pool = storage::connect(database_path).await?;
        Self::from_pool(pool).await
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = storage::connect_in_memory().await?;
        Self::from_pool(pool).await
    }

    /// Create a repository over an existing pool, creating the
    /// blacklist table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize the database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS blacklist_urls (
                url TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a canonical URL. Inserting a URL that is already listed
    /// is a no-op that keeps the original timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn insert(&self, url: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO blacklist_urls (url, created_at) VALUES (?, ?)
            ON CONFLICT(url) DO NOTHING
            ",
        )
        .bind(url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a canonical URL, reporting whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn remove(&self, url: &str) -> Result<bool> {
        let done = sqlx::query(r"DELETE FROM blacklist_urls WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected() > 0)
    }

    /// Whether a canonical URL is in the set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn contains(&self, url: &str) -> Result<bool> {
        let row = sqlx::query(r"SELECT COUNT(*) as count FROM blacklist_urls WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Look up a stored entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, url: &str) -> Result<Option<BlacklistEntry>> {
        let row = sqlx::query(r"SELECT url, created_at FROM blacklist_urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| {
            let created_at: String = r.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .ok()?
                .with_timezone(&Utc);

            Some(BlacklistEntry {
                url: r.get("url"),
                created_at,
            })
        }))
    }
}
