//! SQLite message cache.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{BackendFolder, BackendStorage, VISIBLE_LIMIT_KEY, visible_limit_from};
use crate::error::Result;
use crate::remote::{Flag, MessageHandle};

/// Storage backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new backend with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let backend = Self { pool };
        backend.initialize().await?;
        Ok(backend)
    }

    /// Create an in-memory backend for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let backend = Self { pool };
        backend.initialize().await?;
        Ok(backend)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folders (
                name TEXT NOT NULL,
                extra_key TEXT NOT NULL,
                value INTEGER NOT NULL,
                PRIMARY KEY(name, extra_key)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Dates are RFC 3339 in UTC with second precision so that text
        // comparison matches time order.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder TEXT NOT NULL,
                uid TEXT NOT NULL,
                flags TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                internal_date TEXT,
                envelope_date TEXT,
                subject TEXT,
                structure TEXT,
                body BLOB,
                UNIQUE(folder, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl BackendStorage for SqliteBackend {
    type Folder = SqliteFolder;

    async fn folder(&self, name: &str) -> Result<SqliteFolder> {
        let mut folder = SqliteFolder {
            pool: self.pool.clone(),
            name: name.to_string(),
            visible_limit: None,
        };
        folder.visible_limit = visible_limit_from(folder.folder_extra_number(VISIBLE_LIMIT_KEY).await?);
        Ok(folder)
    }
}

/// A folder of [`SqliteBackend`].
#[derive(Debug, Clone)]
pub struct SqliteFolder {
    pool: SqlitePool,
    name: String,
    visible_limit: Option<usize>,
}

#[async_trait]
impl BackendFolder for SqliteFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn visible_limit(&self) -> Option<usize> {
        self.visible_limit
    }

    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            r"
            SELECT value FROM folders
            WHERE name = ? AND extra_key = ?
            ",
        )
        .bind(&self.name)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get::<i64, _>("value")))
    }

    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO folders (name, extra_key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(name, extra_key) DO UPDATE SET
                value = excluded.value
            ",
        )
        .bind(&self.name)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_all_messages(&self) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE folder = ?")
            .bind(&self.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
        let rows = sqlx::query(
            r"
            SELECT uid,
                   CASE
                       WHEN internal_date IS NULL THEN envelope_date
                       WHEN envelope_date IS NULL THEN internal_date
                       ELSE MIN(internal_date, envelope_date)
                   END AS effective_date
            FROM messages
            WHERE folder = ?
            ",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let uid = row.get::<String, _>("uid");
                let date = row
                    .get::<Option<String>, _>("effective_date")
                    .as_deref()
                    .and_then(parse_date);
                (uid, date)
            })
            .collect())
    }

    async fn destroy_messages(&self, uids: &[String]) -> Result<()> {
        for uid in uids {
            sqlx::query("DELETE FROM messages WHERE folder = ? AND uid = ?")
                .bind(&self.name)
                .bind(uid)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn save_message(&self, message: &MessageHandle) -> Result<()> {
        let envelope_date = message.envelope.as_ref().and_then(|e| e.date);
        let subject = message.envelope.as_ref().and_then(|e| e.subject.clone());

        sqlx::query(
            r"
            INSERT INTO messages
                (folder, uid, flags, size, internal_date, envelope_date, subject, structure, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(folder, uid) DO UPDATE SET
                flags = excluded.flags,
                size = excluded.size,
                internal_date = excluded.internal_date,
                envelope_date = excluded.envelope_date,
                subject = excluded.subject,
                structure = excluded.structure,
                body = excluded.body
            ",
        )
        .bind(&self.name)
        .bind(&message.uid)
        .bind(format_flags(&message.flags))
        .bind(i64::try_from(message.size).unwrap_or(i64::MAX))
        .bind(message.internal_date.map(format_date))
        .bind(envelope_date.map(format_date))
        .bind(subject)
        .bind(message.structure.as_deref())
        .bind(message.body.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn message_flags(&self, uid: &str) -> Result<Option<BTreeSet<Flag>>> {
        let row = sqlx::query("SELECT flags FROM messages WHERE folder = ? AND uid = ?")
            .bind(&self.name)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| parse_flags(&row.get::<String, _>("flags"))))
    }

    async fn update_flags(&self, uid: &str, flags: &BTreeSet<Flag>) -> Result<()> {
        sqlx::query("UPDATE messages SET flags = ? WHERE folder = ? AND uid = ?")
            .bind(format_flags(flags))
            .bind(&self.name)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

fn format_flags(flags: &BTreeSet<Flag>) -> String {
    flags.iter().map(Flag::as_str).collect::<Vec<_>>().join(" ")
}

fn parse_flags(text: &str) -> BTreeSet<Flag> {
    text.split_whitespace().map(Flag::parse).collect()
}
