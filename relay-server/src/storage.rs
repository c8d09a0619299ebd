//! Append-only message storage.
//!
//! The ingest path appends one record per accepted webhook; the export path
//! lists everything, newest first. Two backends:
//! - `SqliteMessageStore`: the `messages` table in a SQLite database
//! - `MemoryMessageStore`: a process-local vector, used by tests

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;

/// Format of `received_at` and of the `[receive_time]` template tag.
pub const RECEIVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A validated webhook ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub from_number: Option<String>,
    pub content: Option<String>,
    pub timestamp: String,
    pub method: String,
    pub path: String,
    /// JSON object of request headers
    pub headers: String,
    /// Raw request body
    pub body: String,
}

/// A persisted message as returned by [`MessageStore::list_all`].
///
/// Field names are the export wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub from_number: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<String>,
    pub received_at: String,
    pub method: Option<String>,
    pub path: Option<String>,
    pub headers: Option<String>,
    pub body: Option<String>,
}

/// Storage collaborator. Implementations handle their own locking.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message, assigning its id and receipt time.
    async fn append(&self, message: NewMessage) -> Result<(), StorageError>;

    /// All messages, most recently received first.
    async fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError>;
}

fn received_at_now() -> String {
    Utc::now().format(RECEIVED_AT_FORMAT).to_string()
}

// =============================================================================
// SQLite
// =============================================================================

/// Messages stored in SQLite.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Open (creating if needed) the database at `database_url` and ensure
    /// the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        debug!("database pool created");

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and ensure the schema exists.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_number TEXT,
                content TEXT,
                timestamp TEXT,
                received_at TEXT NOT NULL,
                method TEXT,
                path TEXT,
                headers TEXT,
                body TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: NewMessage) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                from_number, content, timestamp, received_at, method, path, headers, body
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.from_number)
        .bind(&message.content)
        .bind(&message.timestamp)
        .bind(received_at_now())
        .bind(&message.method)
        .bind(&message.path)
        .bind(&message.headers)
        .bind(&message.body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError> {
        let rows = sqlx::query_as::<_, StoredMessage>(
            r#"
            SELECT id, from_number, content, timestamp, received_at, method, path, headers, body
            FROM messages
            ORDER BY received_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Messages kept in process memory.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: NewMessage) -> Result<(), StorageError> {
        let mut messages = self.messages.write().await;
        let id = messages.len() as i64 + 1;

        messages.push(StoredMessage {
            id,
            from_number: message.from_number,
            content: message.content,
            timestamp: Some(message.timestamp),
            received_at: received_at_now(),
            method: Some(message.method),
            path: Some(message.path),
            headers: Some(message.headers),
            body: Some(message.body),
        });

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError> {
        Ok(self.messages.read().await.iter().rev().cloned().collect())
    }
}
