use byte_common::{ConversationKey, Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use tokio::sync::Mutex;

use crate::connection;

/// Last-activity bookkeeping for one conversation, used to decide when the
/// bot should nudge a quiet conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub conversation: ConversationKey,
    /// Channel the nudge is delivered to.
    pub channel_id: String,
    pub is_direct: bool,
    pub last_message_at: DateTime<Utc>,
    pub next_message_at: DateTime<Utc>,
}

pub struct ActivityStore {
    conn: Mutex<Connection>,
}

impl ActivityStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::with_connection(connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversation_times (
                conversation_id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                is_direct INTEGER NOT NULL DEFAULT 0,
                last_message_time TEXT NOT NULL,
                next_message_time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversation_times_next
                ON conversation_times(next_message_time);",
        )
        .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record activity for a conversation and schedule its next nudge.
    pub async fn touch(
        &self,
        conversation: &ConversationKey,
        channel_id: &str,
        is_direct: bool,
        now: DateTime<Utc>,
        next_message_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO conversation_times
                (conversation_id, channel_id, is_direct, last_message_time, next_message_time)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(conversation_id) DO UPDATE SET
               channel_id = excluded.channel_id,
               is_direct = excluded.is_direct,
               last_message_time = excluded.last_message_time,
               next_message_time = excluded.next_message_time",
            params![
                conversation.as_str(),
                channel_id,
                is_direct,
                now.to_rfc3339(),
                next_message_at.to_rfc3339()
            ],
        )
        .map_err(|e| Error::Database(format!("failed to record activity: {e}")))?;
        Ok(())
    }

    /// Move only the next nudge time, leaving the last activity untouched.
    pub async fn reschedule(
        &self,
        conversation: &ConversationKey,
        next_message_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE conversation_times SET next_message_time = ?2 WHERE conversation_id = ?1",
                params![conversation.as_str(), next_message_at.to_rfc3339()],
            )
            .map_err(|e| Error::Database(format!("failed to reschedule nudge: {e}")))?;
        Ok(changed > 0)
    }

    pub async fn remove(&self, conversation: &ConversationKey) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM conversation_times WHERE conversation_id = ?1",
            params![conversation.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to remove activity: {e}")))?;
        Ok(())
    }

    /// Conversations whose next nudge time is at or before `now`, oldest first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT conversation_id, channel_id, is_direct, last_message_time, next_message_time
                 FROM conversation_times
                 ORDER BY next_message_time ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare activity query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to load activity: {e}")))?;

        let mut due = Vec::new();
        for row in rows {
            let (id, channel_id, is_direct, last_raw, next_raw) =
                row.map_err(|e| Error::Database(format!("failed to read activity row: {e}")))?;
            let (Some(last), Some(next)) = (
                connection::parse_timestamp(&last_raw),
                connection::parse_timestamp(&next_raw),
            ) else {
                continue;
            };
            if next <= now {
                due.push(ActivityRecord {
                    conversation: ConversationKey::from_string(id),
                    channel_id,
                    is_direct,
                    last_message_at: last,
                    next_message_at: next,
                });
            }
        }
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn due_returns_only_elapsed_rows() {
        let store = ActivityStore::in_memory().unwrap();
        let now = Utc::now();
        let quiet = ConversationKey::channel(1_u64);
        let busy = ConversationKey::channel(2_u64);

        store
            .touch(&quiet, "1", false, now - Duration::days(3), now - Duration::minutes(1))
            .await
            .unwrap();
        store
            .touch(&busy, "2", false, now, now + Duration::days(2))
            .await
            .unwrap();

        let due = store.due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].conversation, quiet);
        assert_eq!(due[0].channel_id, "1");
        assert!(!due[0].is_direct);
    }

    #[tokio::test]
    async fn reschedule_moves_next_time_only() {
        let store = ActivityStore::in_memory().unwrap();
        let now = Utc::now();
        let key = ConversationKey::direct(7_u64);
        store
            .touch(&key, "dm-7", true, now - Duration::days(5), now - Duration::hours(1))
            .await
            .unwrap();

        assert!(store.reschedule(&key, now + Duration::days(3)).await.unwrap());
        assert!(store.due(now).await.unwrap().is_empty());
        assert!(
            !store
                .reschedule(&ConversationKey::direct(8_u64), now)
                .await
                .unwrap()
        );

        let later = store.due(now + Duration::days(4)).await.unwrap();
        assert_eq!(later.len(), 1);
        assert!(later[0].is_direct);
        assert!(later[0].last_message_at < now - Duration::days(4));
    }

    #[tokio::test]
    async fn touch_replaces_previous_schedule() {
        let store = ActivityStore::in_memory().unwrap();
        let now = Utc::now();
        let key = ConversationKey::channel(3_u64);
        store
            .touch(&key, "3", false, now - Duration::days(9), now - Duration::days(1))
            .await
            .unwrap();
        store
            .touch(&key, "3", false, now, now + Duration::days(2))
            .await
            .unwrap();
        assert!(store.due(now).await.unwrap().is_empty());

        store.remove(&key).await.unwrap();
        assert!(store.due(now + Duration::days(10)).await.unwrap().is_empty());
    }
}
