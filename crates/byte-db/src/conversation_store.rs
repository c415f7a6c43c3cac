use async_trait::async_trait;
use byte_common::{ConversationKey, Error, Result, Turn};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

use crate::connection;

/// Keyed store of conversation histories.
///
/// Writers are serialized per key by the conversation gate, so the store only
/// has to keep each individual call atomic; last writer wins.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load the full turn sequence for `key`, or `None` if nothing is stored.
    async fn get(&self, key: &ConversationKey) -> Result<Option<Vec<Turn>>>;

    /// Replace the stored sequence for `key` with `turns`.
    async fn replace(&self, key: &ConversationKey, turns: &[Turn]) -> Result<()>;

    /// Remove the conversation entirely.
    async fn delete(&self, key: &ConversationKey) -> Result<()>;

    /// Read-modify-write helper appending `turns` to the stored sequence.
    ///
    /// Fails if nothing is stored under `key`; a conversation only starts
    /// with its system turn.
    async fn append(&self, key: &ConversationKey, turns: &[Turn]) -> Result<Vec<Turn>> {
        let mut conversation = self
            .get(key)
            .await?
            .ok_or_else(|| Error::Database(format!("conversation {key} does not exist")))?;
        conversation.extend_from_slice(turns);
        self.replace(key, &conversation).await?;
        Ok(conversation)
    }
}

/// SQLite-backed conversation store; one row per conversation holding the
/// JSON-encoded turn list.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

impl SqliteConversationStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(connection::open(db_path)?),
        };
        store.run_migrations_blocking()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(connection::open_in_memory()?),
        };
        store.run_migrations_blocking()?;
        Ok(store)
    }

    fn run_migrations_blocking(&self) -> Result<()> {
        let conn = self
            .conn
            .try_lock()
            .map_err(|_| Error::Database("store locked during migration".into()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                conversation TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Number of stored conversations.
    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to count conversations: {e}")))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Vec<Turn>>> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT conversation FROM conversations WHERE conversation_id = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load conversation: {e}")))?;

        raw.map(|json| {
            serde_json::from_str::<Vec<Turn>>(&json).map_err(|e| {
                Error::Database(format!("corrupt conversation {key}: {e}"))
            })
        })
        .transpose()
    }

    async fn replace(&self, key: &ConversationKey, turns: &[Turn]) -> Result<()> {
        let json = serde_json::to_string(turns)
            .map_err(|e| Error::Database(format!("failed to encode conversation: {e}")))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO conversations (conversation_id, conversation)
             VALUES (?1, ?2)
             ON CONFLICT(conversation_id) DO UPDATE SET
               conversation = excluded.conversation,
               updated_at = datetime('now')",
            params![key.as_str(), json],
        )
        .map_err(|e| Error::Database(format!("failed to store conversation: {e}")))?;
        debug!(conversation = %key, turns = turns.len(), "conversation stored");
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM conversations WHERE conversation_id = ?1",
            params![key.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to delete conversation: {e}")))?;
        Ok(())
    }
}
