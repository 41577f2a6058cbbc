//! Label storage repository.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::directory::LabelDirectory;
use super::model::{Label, LabelId, SystemLabel};
use crate::user::UserId;
use crate::{Error, Result, storage};

/// Repository for label storage and lookup.
pub struct LabelStore {
    pool: SqlitePool,
}

impl LabelStore {
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

    /// Create a repository over an existing pool, creating the labels
    /// table if it doesn't exist.
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
            CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL COLLATE NOCASE,
                UNIQUE(owner_id, name)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_labels_owner ON labels(owner_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Create a label for an owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty name and
    /// [`Error::Conflict`] if the owner already has a label with this
    /// name in any casing.
    pub async fn create(&self, owner: UserId, name: &str) -> Result<Label> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("label name must not be empty".to_string()));
        }

        let result = sqlx::query(r"INSERT INTO labels (owner_id, name) VALUES (?, ?)")
            .bind(owner.0)
            .bind(name)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(Label {
                id: LabelId(done.last_insert_rowid()),
                owner_id: owner,
                name: name.to_string(),
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
                "label {name:?} already exists"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up one of the owner's labels by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, owner: UserId, id: LabelId) -> Result<Option<Label>> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, name FROM labels
            WHERE owner_id = ? AND id = ?
            ",
        )
        .bind(owner.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_label(&r)))
    }

    /// Look up one of the owner's labels by name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_name(&self, owner: UserId, name: &str) -> Result<Option<Label>> {
        // the name column collates NOCASE, so equality ignores case
        let row = sqlx::query(
            r"
            SELECT id, owner_id, name FROM labels
            WHERE owner_id = ? AND name = ?
            ",
        )
        .bind(owner.0)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_label(&r)))
    }

    /// List all of the owner's labels in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Label>> {
        let rows = sqlx::query(
            r"
            SELECT id, owner_id, name FROM labels
            WHERE owner_id = ? ORDER BY id
            ",
        )
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_label).collect())
    }

    /// Seed the system labels for a new account and return the owner's
    /// full label set. Labels that already exist are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn seed_defaults(&self, owner: UserId) -> Result<Vec<Label>> {
        for label in SystemLabel::ALL {
            sqlx::query(
                r"
                INSERT INTO labels (owner_id, name) VALUES (?, ?)
                ON CONFLICT(owner_id, name) DO NOTHING
                ",
            )
            .bind(owner.0)
            .bind(label.name())
            .execute(&self.pool)
            .await?;
        }

        self.list_for_owner(owner).await
    }
}

impl LabelDirectory for LabelStore {
    async fn resolve_by_id(&self, owner: UserId, id: LabelId) -> Result<Option<Label>> {
        self.get(owner, id).await
    }

    async fn resolve_by_name(&self, owner: UserId, name: &str) -> Result<Option<Label>> {
        self.get_by_name(owner, name).await
    }
}

fn row_to_label(row: &SqliteRow) -> Label {
    Label {
        id: LabelId(row.get("id")),
        owner_id: UserId(row.get("owner_id")),
        name: row.get("name"),
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}
