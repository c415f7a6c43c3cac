use byte_common::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tokio::sync::Mutex;

use crate::connection;

/// Per-user IANA timezone preferences used to timestamp user turns.
pub struct TimezoneStore {
    conn: Mutex<Connection>,
}

impl TimezoneStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::with_connection(connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_timezones (
                user_id TEXT PRIMARY KEY,
                timezone TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn get_timezone(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT timezone FROM user_timezones WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load timezone: {e}")))
    }

    pub async fn set_timezone(&self, user_id: &str, timezone: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_timezones (user_id, timezone) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET timezone = excluded.timezone",
            params![user_id, timezone],
        )
        .map_err(|e| Error::Database(format!("failed to store timezone: {e}")))?;
        Ok(())
    }
}
