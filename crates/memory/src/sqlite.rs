//! SQLite summary store.
//!
//! One table, `conversation_windows`, keyed by `(channel_id, window_number)`.
//! Writes are upserts on that key so a summarizer can refine a window in
//! place. Timestamps are stored as RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use threadwise_core::error::StoreError;
use threadwise_core::summary::{ConversationWindow, FileDescriptor, SummaryStore, WindowUpdate};
use tracing::{debug, info};

pub struct SqliteSummaryStore {
    pool: SqlitePool,
}

impl SqliteSummaryStore {
    /// Open (creating if missing) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database; it is limited to
    /// one connection because each in-memory connection is its own database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite summary store initialized at {path}");
        Ok(store)
    }

    /// Open the database file at `path`, creating parent directories.
    pub async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
        }
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_windows (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id       TEXT NOT NULL,
                window_number    INTEGER NOT NULL,
                summary          TEXT NOT NULL,
                file_descriptors TEXT NOT NULL DEFAULT '[]',
                last_message_id  TEXT,
                last_message_at  TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL,
                UNIQUE(channel_id, window_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation_windows table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_time(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn row_to_window(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationWindow, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let channel_id: String = row.try_get("channel_id").map_err(|e| column("channel_id", e))?;
        let window_number: i64 = row.try_get("window_number").map_err(|e| column("window_number", e))?;
        let summary: String = row.try_get("summary").map_err(|e| column("summary", e))?;
        let files_json: String = row
            .try_get("file_descriptors")
            .map_err(|e| column("file_descriptors", e))?;
        let last_message_id: Option<String> = row
            .try_get("last_message_id")
            .map_err(|e| column("last_message_id", e))?;
        let last_message_at: Option<String> = row
            .try_get("last_message_at")
            .map_err(|e| column("last_message_at", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| column("updated_at", e))?;

        let file_descriptors: Vec<FileDescriptor> = serde_json::from_str(&files_json).unwrap_or_default();

        Ok(ConversationWindow {
            channel_id,
            window_number: u32::try_from(window_number)
                .map_err(|_| StoreError::QueryFailed(format!("window_number out of range: {window_number}")))?,
            summary,
            file_descriptors,
            last_message_id,
            last_message_at: last_message_at.as_deref().and_then(Self::parse_time),
            created_at: Self::parse_time(&created_at).unwrap_or_else(Utc::now),
            updated_at: Self::parse_time(&updated_at).unwrap_or_else(Utc::now),
        })
    }

    async fn fetch_window(&self, channel_id: &str, window_number: u32) -> Result<Option<ConversationWindow>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversation_windows WHERE channel_id = ?1 AND window_number = ?2")
            .bind(channel_id)
            .bind(i64::from(window_number))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("fetch window: {e}")))?;
        row.as_ref().map(Self::row_to_window).transpose()
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn latest_by_channel(&self, channel_id: &str) -> Result<Option<ConversationWindow>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM conversation_windows WHERE channel_id = ?1 ORDER BY window_number DESC LIMIT 1",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("latest window: {e}")))?;

        row.as_ref().map(Self::row_to_window).transpose()
    }

    async fn list_by_channel(&self, channel_id: &str) -> Result<Vec<ConversationWindow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM conversation_windows WHERE channel_id = ?1 ORDER BY window_number ASC")
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list windows: {e}")))?;

        rows.iter().map(Self::row_to_window).collect()
    }

    async fn create_or_update(&self, update: WindowUpdate) -> Result<ConversationWindow, StoreError> {
        let files_json = serde_json::to_string(&update.file_descriptors)
            .map_err(|e| StoreError::Storage(format!("file_descriptors serialization: {e}")))?;
        let now = Utc::now().to_rfc3339();
        let last_message_at = update.last_message_at.map(|t| t.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO conversation_windows
                (channel_id, window_number, summary, file_descriptors, last_message_id, last_message_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(channel_id, window_number) DO UPDATE SET
                summary = excluded.summary,
                file_descriptors = excluded.file_descriptors,
                last_message_id = excluded.last_message_id,
                last_message_at = excluded.last_message_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&update.channel_id)
        .bind(i64::from(update.window_number))
        .bind(&update.summary)
        .bind(&files_json)
        .bind(&update.last_message_id)
        .bind(&last_message_at)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT failed: {e}")))?;

        debug!(
            channel_id = %update.channel_id,
            window_number = update.window_number,
            "Stored conversation window"
        );

        self.fetch_window(&update.channel_id, update.window_number)
            .await?
            .ok_or_else(|| StoreError::QueryFailed("window missing after upsert".into()))
    }
}
