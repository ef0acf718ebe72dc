//! Bounded connection pool over a single SQLite database path.
//!
//! Grounded on the teacher's `memory::sqlite_store::SqliteMemoryStore`, which
//! wraps one `rusqlite::Connection` in an `Arc<Mutex<…>>`. This module keeps
//! that single-writer idiom but holds `size` connections in a queue gated by
//! a `tokio::sync::Semaphore`, so callers acquire a connection as a scoped
//! guard with guaranteed release on every exit path (§4.1).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    images TEXT,
    timestamp TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_history_session ON history (session_id);

CREATE TABLE IF NOT EXISTS tool_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT,
    tool TEXT NOT NULL,
    arguments TEXT NOT NULL,
    error TEXT NOT NULL,
    timestamp TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_tool_errors_session ON tool_errors (session_id);

CREATE TABLE IF NOT EXISTS summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    original_messages TEXT NOT NULL,
    summary_text TEXT NOT NULL,
    timestamp TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_summaries_session ON summaries (session_id);
"#;

/// Table/column pairs the schema is expected to carry. Checked on open so a
/// database created by an older version of this schema gains new columns in
/// place rather than failing to open (§4.1 migration policy).
const EXPECTED_COLUMNS: &[(&str, &str, &str)] = &[
    ("history", "images", "TEXT"),
    ("tool_errors", "session_id", "TEXT"),
];

fn ensure_schema(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| format!("STORAGE_ERROR: schema init failed: {e}"))?;

    for (table, column, ty) in EXPECTED_COLUMNS {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        let has_column = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?
            .filter_map(|r| r.ok())
            .any(|name| &name == column);
        if !has_column {
            conn.execute(
                &format!("ALTER TABLE {table} ADD COLUMN {column} {ty}"),
                [],
            )
            .map_err(|e| format!("STORAGE_ERROR: migration failed: {e}"))?;
        }
    }

    Ok(())
}

fn open_connection(path: &str) -> Result<Connection, String> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .map_err(|e| format!("STORAGE_ERROR: open failed: {e}"))?;

    if path != ":memory:" {
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
    }
    ensure_schema(&conn)?;
    Ok(conn)
}

struct PoolInner {
    queue: Mutex<VecDeque<Connection>>,
    semaphore: Arc<Semaphore>,
}

/// A checked-out connection. Returned to the pool's queue on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        #[allow(clippy::expect_used)]
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.inner.queue.lock().push_back(conn);
        }
    }
}

/// Bounded pool of reusable connections keyed by database path (§4.1).
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn open(path: &str, size: usize) -> Result<Self, String> {
        let size = size.max(1);
        let mut queue = VecDeque::with_capacity(size);
        for _ in 0..size {
            queue.push_back(open_connection(path)?);
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                queue: Mutex::new(queue),
                semaphore: Arc::new(Semaphore::new(size)),
            }),
        })
    }

    pub fn in_memory(size: usize) -> Result<Self, String> {
        Self::open(":memory:", size)
    }

    /// Acquire a connection, blocking (asynchronously) until one is free.
    pub async fn acquire(&self) -> Result<PooledConnection, String> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| format!("STORAGE_ERROR: pool closed: {e}"))?;
        let conn = self
            .inner
            .queue
            .lock()
            .pop_front()
            .ok_or_else(|| "STORAGE_ERROR: pool exhausted despite permit".to_string())?;
        Ok(PooledConnection {
            conn: Some(conn),
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Close the pool: drains the queue so no further connections can be
    /// checked out, even if permits remain outstanding.
    pub fn close(&self) {
        self.inner.queue.lock().clear();
        self.inner.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release_round_trip() {
        let pool = ConnectionPool::in_memory(2).unwrap();
        let conn = pool.acquire().await.unwrap();
        conn.execute_batch("SELECT 1").unwrap();
        drop(conn);
        let _conn2 = pool.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn acquire_blocks_until_release() {
        let pool = Arc::new(ConnectionPool::in_memory(1).unwrap());
        let conn = pool.acquire().await.unwrap();

        let pool2 = pool.clone();
        let handle = tokio::spawn(async move {
            let _c = pool2.acquire().await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "second acquire should still be waiting");

        drop(conn);
        handle.await.unwrap();
    }

    #[test]
    fn schema_creates_expected_tables() {
        let conn = open_connection(":memory:").unwrap();
        for table in ["history", "tool_errors", "summaries"] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {table} should exist");
        }
    }
}
