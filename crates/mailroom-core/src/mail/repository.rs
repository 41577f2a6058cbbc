//! Mail storage repository.
//!
//! The mail queries join the `labels` table for draft detection and
//! label-name search, so [`MailStore`] expects to share a database with
//! [`crate::label::LabelStore`].

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::model::{Mail, MailId};
use crate::label::LabelId;
use crate::user::UserId;
use crate::{Result, storage};

/// Newest-first result cap for list and search queries.
const RESULT_LIMIT: i64 = 50;

/// Repository for mail storage and visibility-scoped queries.
pub struct MailStore {
    pool: SqlitePool,
}

impl MailStore {
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

    /// Create a repository over an existing pool, creating the mail
    /// tables if they don't exist.
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
            CREATE TABLE IF NOT EXISTS mails (
                id INTEGER PRIMARY KEY,
                from_addr TEXT NOT NULL,
                to_addr TEXT,
                sender_id INTEGER NOT NULL,
                receiver_id INTEGER,
                subject TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                date_sent TEXT,
                is_spam INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_labels (
                mail_id INTEGER NOT NULL,
                label_id INTEGER NOT NULL,
                PRIMARY KEY (mail_id, label_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_hidden (
                mail_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                PRIMARY KEY (mail_id, user_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_mails_sender ON mails(sender_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_mails_receiver ON mails(receiver_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_mail_labels_label ON mail_labels(label_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Allocate the next mail id from the durable sequence.
    ///
    /// The upsert increments and reads in one statement, so ids are
    /// unique and monotonic across concurrent senders and restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn next_mail_id(&self) -> Result<MailId> {
        let row = sqlx::query(
            r"
            INSERT INTO counters (name, value) VALUES ('mail_id', 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            RETURNING value
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        let value: i64 = row.get("value");
        Ok(MailId(value))
    }

    /// Insert a mail record with its labels and hidden set.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn insert_mail(&self, mail: &Mail) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO mails
                (id, from_addr, to_addr, sender_id, receiver_id,
                 subject, content, date_sent, is_spam, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(mail.id.0)
        .bind(&mail.from)
        .bind(mail.to.as_deref())
        .bind(mail.sender_id.0)
        .bind(mail.receiver_id.map(|u| u.0))
        .bind(&mail.subject)
        .bind(&mail.content)
        .bind(mail.date_sent.map(|d| d.to_rfc3339()))
        .bind(mail.is_spam)
        .bind(mail.version)
        .execute(&mut *tx)
        .await?;

        for label_id in &mail.label_ids {
            sqlx::query(r"INSERT OR IGNORE INTO mail_labels (mail_id, label_id) VALUES (?, ?)")
                .bind(mail.id.0)
                .bind(label_id.0)
                .execute(&mut *tx)
                .await?;
        }

        for user in &mail.hidden_from {
            sqlx::query(r"INSERT OR IGNORE INTO mail_hidden (mail_id, user_id) VALUES (?, ?)")
                .bind(mail.id.0)
                .bind(user.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetch a mail by id, with labels and hidden set attached.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn get_mail(&self, id: MailId) -> Result<Option<Mail>> {
        let Some(row) = sqlx::query(
            r"
            SELECT id, from_addr, to_addr, sender_id, receiver_id,
                   subject, content, date_sent, is_spam, version
            FROM mails WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(self.hydrate(&row).await?))
    }

    /// Write updated draft fields and the replacement label set if the
    /// version still matches. Returns `false` when another writer got
    /// there first.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn update_mail(&self, mail: &Mail) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let done = sqlx::query(
            r"
            UPDATE mails
            SET to_addr = ?, receiver_id = ?, subject = ?, content = ?,
                date_sent = ?, is_spam = ?, version = version + 1
            WHERE id = ? AND version = ?
            ",
        )
        .bind(mail.to.as_deref())
        .bind(mail.receiver_id.map(|u| u.0))
        .bind(&mail.subject)
        .bind(&mail.content)
        .bind(mail.date_sent.map(|d| d.to_rfc3339()))
        .bind(mail.is_spam)
        .bind(mail.id.0)
        .bind(mail.version)
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(r"DELETE FROM mail_labels WHERE mail_id = ?")
            .bind(mail.id.0)
            .execute(&mut *tx)
            .await?;

        for label_id in &mail.label_ids {
            sqlx::query(r"INSERT OR IGNORE INTO mail_labels (mail_id, label_id) VALUES (?, ?)")
                .bind(mail.id.0)
                .bind(label_id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Attach a label if the version still matches. Attaching an
    /// already-present label still counts as a mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn attach_label(
        &self,
        id: MailId,
        label: LabelId,
        expected_version: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let done = sqlx::query(
            r"UPDATE mails SET version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(r"INSERT OR IGNORE INTO mail_labels (mail_id, label_id) VALUES (?, ?)")
            .bind(id.0)
            .bind(label.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Detach a label if the version still matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn detach_label(
        &self,
        id: MailId,
        label: LabelId,
        expected_version: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let done = sqlx::query(
            r"UPDATE mails SET version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(r"DELETE FROM mail_labels WHERE mail_id = ? AND label_id = ?")
            .bind(id.0)
            .bind(label.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Apply a spam verdict in one mutation: set or clear the flag and
    /// attach or detach the given spam labels.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn set_spam(
        &self,
        id: MailId,
        spam: bool,
        spam_labels: &[LabelId],
        expected_version: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let done = sqlx::query(
            r"UPDATE mails SET is_spam = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind(spam)
        .bind(id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for label in spam_labels {
            if spam {
                sqlx::query(r"INSERT OR IGNORE INTO mail_labels (mail_id, label_id) VALUES (?, ?)")
                    .bind(id.0)
                    .bind(label.0)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(r"DELETE FROM mail_labels WHERE mail_id = ? AND label_id = ?")
                    .bind(id.0)
                    .bind(label.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Hide a mail from one user's view. Idempotent, and not a
    /// versioned mutation: hiding cannot conflict with anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn hide_from(&self, id: MailId, user: UserId) -> Result<()> {
        sqlx::query(r"INSERT OR IGNORE INTO mail_hidden (mail_id, user_id) VALUES (?, ?)")
            .bind(id.0)
            .bind(user.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Hard-delete a mail with its label and hidden rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn delete_mail(&self, id: MailId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r"DELETE FROM mail_labels WHERE mail_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM mail_hidden WHERE mail_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM mails WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The newest mails visible to the requester, at most
    /// [`RESULT_LIMIT`] of them.
    ///
    /// Visible means: the requester is a party, has not hidden the
    /// mail, and the mail is not someone else's draft.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn list_recent(&self, requester: UserId) -> Result<Vec<Mail>> {
        let rows = sqlx::query(
            r"
            SELECT m.id, m.from_addr, m.to_addr, m.sender_id, m.receiver_id,
                   m.subject, m.content, m.date_sent, m.is_spam, m.version
            FROM mails m
            WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
              AND NOT EXISTS (
                  SELECT 1 FROM mail_hidden h
                  WHERE h.mail_id = m.id AND h.user_id = ?1
              )
              AND NOT (m.sender_id != ?1 AND EXISTS (
                  SELECT 1 FROM mail_labels ml
                  JOIN labels l ON l.id = ml.label_id
                  WHERE ml.mail_id = m.id
                    AND l.owner_id = m.sender_id AND l.name = 'Drafts'
              ))
            ORDER BY m.date_sent DESC
            LIMIT ?2
            ",
        )
        .bind(requester.0)
        .bind(RESULT_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(&rows).await
    }

    /// The newest visible mails carrying a label, at most
    /// [`RESULT_LIMIT`] of them.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn list_by_label(&self, label: LabelId, requester: UserId) -> Result<Vec<Mail>> {
        let rows = sqlx::query(
            r"
            SELECT m.id, m.from_addr, m.to_addr, m.sender_id, m.receiver_id,
                   m.subject, m.content, m.date_sent, m.is_spam, m.version
            FROM mails m
            WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
              AND NOT EXISTS (
                  SELECT 1 FROM mail_hidden h
                  WHERE h.mail_id = m.id AND h.user_id = ?1
              )
              AND NOT (m.sender_id != ?1 AND EXISTS (
                  SELECT 1 FROM mail_labels ml
                  JOIN labels l ON l.id = ml.label_id
                  WHERE ml.mail_id = m.id
                    AND l.owner_id = m.sender_id AND l.name = 'Drafts'
              ))
              AND EXISTS (
                  SELECT 1 FROM mail_labels ml2
                  WHERE ml2.mail_id = m.id AND ml2.label_id = ?2
              )
            ORDER BY m.date_sent DESC
            LIMIT ?3
            ",
        )
        .bind(requester.0)
        .bind(label.0)
        .bind(RESULT_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(&rows).await
    }

    /// Case-insensitive substring search over the requester's visible
    /// mails: subject, content, both addresses, and the names of the
    /// requester's own labels on the mail. Newest first, at most
    /// [`RESULT_LIMIT`] results.
    ///
    /// Matching happens here rather than in SQL: SQLite's `lower()`
    /// folds ASCII only, which would silently miss non-ASCII text.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn search(&self, needle: &str, requester: UserId) -> Result<Vec<Mail>> {
        let needle = needle.to_lowercase();

        let rows = sqlx::query(
            r"
            SELECT m.id, m.from_addr, m.to_addr, m.sender_id, m.receiver_id,
                   m.subject, m.content, m.date_sent, m.is_spam, m.version
            FROM mails m
            WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
              AND NOT EXISTS (
                  SELECT 1 FROM mail_hidden h
                  WHERE h.mail_id = m.id AND h.user_id = ?1
              )
              AND NOT (m.sender_id != ?1 AND EXISTS (
                  SELECT 1 FROM mail_labels ml
                  JOIN labels l ON l.id = ml.label_id
                  WHERE ml.mail_id = m.id
                    AND l.owner_id = m.sender_id AND l.name = 'Drafts'
              ))
            ORDER BY m.date_sent DESC
            ",
        )
        .bind(requester.0)
        .fetch_all(&self.pool)
        .await?;

        let limit = usize::try_from(RESULT_LIMIT).unwrap_or(usize::MAX);
        let mut hits = Vec::new();
        for row in &rows {
            if hits.len() == limit {
                break;
            }
            let mail = self.hydrate(row).await?;
            if self.matches(&mail, &needle, requester).await? {
                hits.push(mail);
            }
        }
        Ok(hits)
    }

    /// Whether a mail matches a lowercased needle for this requester.
    async fn matches(&self, mail: &Mail, needle: &str, requester: UserId) -> Result<bool> {
        let text_hit = mail.subject.to_lowercase().contains(needle)
            || mail.content.to_lowercase().contains(needle)
            || mail.from.to_lowercase().contains(needle)
            || mail
                .to
                .as_deref()
                .is_some_and(|to| to.to_lowercase().contains(needle));
        if text_hit {
            return Ok(true);
        }

        let rows = sqlx::query(
            r"
            SELECT l.name FROM mail_labels ml
            JOIN labels l ON l.id = ml.label_id
            WHERE ml.mail_id = ?1 AND l.owner_id = ?2
            ",
        )
        .bind(mail.id.0)
        .bind(requester.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .any(|r| r.get::<String, _>("name").to_lowercase().contains(needle)))
    }

    async fn hydrate_all(&self, rows: &[SqliteRow]) -> Result<Vec<Mail>> {
        let mut mails = Vec::with_capacity(rows.len());
        for row in rows {
            mails.push(self.hydrate(row).await?);
        }
        Ok(mails)
    }

    /// Attach label and hidden-set rows to a mails row.
    async fn hydrate(&self, row: &SqliteRow) -> Result<Mail> {
        let id = MailId(row.get("id"));

        let label_rows =
            sqlx::query(r"SELECT label_id FROM mail_labels WHERE mail_id = ? ORDER BY rowid")
                .bind(id.0)
                .fetch_all(&self.pool)
                .await?;
        let label_ids = label_rows.iter().map(|r| LabelId(r.get("label_id"))).collect();

        let hidden_rows =
            sqlx::query(r"SELECT user_id FROM mail_hidden WHERE mail_id = ? ORDER BY rowid")
                .bind(id.0)
                .fetch_all(&self.pool)
                .await?;
        let hidden_from = hidden_rows.iter().map(|r| UserId(r.get("user_id"))).collect();

        let date_sent = row
            .get::<Option<String>, _>("date_sent")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc));

        Ok(Mail {
            id,
            from: row.get("from_addr"),
            to: row.get("to_addr"),
            sender_id: UserId(row.get("sender_id")),
            receiver_id: row.get::<Option<i64>, _>("receiver_id").map(UserId),
            subject: row.get("subject"),
            content: row.get("content"),
            label_ids,
            date_sent,
            hidden_from,
            is_spam: row.get("is_spam"),
            version: row.get("version"),
        })
    }
}
