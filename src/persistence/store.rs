//! Durable storage of messages, summaries, and tool errors (C1, §4.1).

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::models::{Message, Role, SessionSummary, SummaryRecord, ToolErrorRecord};
use super::pool::ConnectionPool;

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Facade over the connection pool implementing the §4.1 contract.
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn open(path: &str, pool_size: usize) -> Result<Self, String> {
        Ok(Self::new(ConnectionPool::open(path, pool_size)?))
    }

    pub fn in_memory(pool_size: usize) -> Result<Self, String> {
        Ok(Self::new(ConnectionPool::in_memory(pool_size)?))
    }

    /// Replace the full message list for `session_id` atomically.
    pub async fn save_messages(&self, session_id: &str, messages: &[Message]) -> Result<(), String> {
        let conn = self.pool.acquire().await?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        tx.execute("DELETE FROM history WHERE session_id = ?1", params![session_id])
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        for message in messages {
            let images_json = message
                .images
                .as_ref()
                .map(|imgs| serde_json::to_string(imgs))
                .transpose()
                .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
            tx.execute(
                "INSERT INTO history (session_id, role, content, images, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.session_id,
                    message.role.as_str(),
                    message.content,
                    images_json,
                    message.timestamp.to_rfc3339(),
                ],
            )
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        }

        tx.commit().map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        Ok(())
    }

    /// Messages ordered by timestamp ascending.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, String> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, role, content, images, timestamp FROM history \
                 WHERE session_id = ?1 ORDER BY timestamp ASC, id ASC",
            )
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                let role_str: String = row.get(1)?;
                let images_json: Option<String> = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok((row.get::<_, String>(0)?, role_str, row.get::<_, String>(2)?, images_json, timestamp))
            })
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        let mut messages = Vec::new();
        for row in rows.filter_map(|r| r.ok()) {
            let (session_id, role_str, content, images_json, timestamp) = row;
            let role = Role::parse(&role_str).unwrap_or(Role::System);
            let images = images_json
                .and_then(|s| serde_json::from_str(&s).ok());
            messages.push(Message {
                session_id,
                role,
                content,
                images,
                timestamp: parse_ts(&timestamp),
            });
        }
        Ok(messages)
    }

    /// Most recent messages across all sessions, newest first.
    pub async fn get_recent_messages(&self, limit: usize) -> Result<Vec<Message>, String> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, role, content, images, timestamp FROM history \
                 ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let role_str: String = row.get(1)?;
                let images_json: Option<String> = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok((row.get::<_, String>(0)?, role_str, row.get::<_, String>(2)?, images_json, timestamp))
            })
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        Ok(rows
            .filter_map(|r| r.ok())
            .map(|(session_id, role_str, content, images_json, timestamp)| Message {
                session_id,
                role: Role::parse(&role_str).unwrap_or(Role::System),
                content,
                images: images_json.and_then(|s| serde_json::from_str(&s).ok()),
                timestamp: parse_ts(&timestamp),
            })
            .collect())
    }

    /// User-facing table names for the `schema://tables` resource.
    pub async fn list_tables(&self) -> Result<Vec<String>, String> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Column metadata for `schema://<table>/columns`.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, String> {
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err("STORAGE_ERROR: invalid table name".to_string());
        }
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn get_all_sessions(&self) -> Result<Vec<SessionSummary>, String> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, count(*), min(timestamp), max(timestamp) \
                 FROM history GROUP BY session_id ORDER BY max(timestamp) DESC",
            )
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        Ok(rows
            .filter_map(|r| r.ok())
            .map(|(session_id, message_count, first_ts, last_ts)| SessionSummary {
                session_id,
                message_count,
                first_ts: parse_ts(&first_ts),
                last_ts: parse_ts(&last_ts),
            })
            .collect())
    }

    pub async fn save_error(
        &self,
        session_id: Option<&str>,
        tool: &str,
        arguments: &serde_json::Value,
        error: &str,
    ) -> Result<(), String> {
        let conn = self.pool.acquire().await?;
        let arguments_json = serde_json::to_string(arguments).map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        conn.execute(
            "INSERT INTO tool_errors (session_id, tool, arguments, error, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, tool, arguments_json, error, Utc::now().to_rfc3339()],
        )
        .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        Ok(())
    }

    pub async fn get_recent_errors(
        &self,
        limit: usize,
        session_id: Option<&str>,
    ) -> Result<Vec<ToolErrorRecord>, String> {
        let conn = self.pool.acquire().await?;

        let mut stmt = if session_id.is_some() {
            conn.prepare(
                "SELECT session_id, tool, arguments, error, timestamp FROM tool_errors \
                 WHERE session_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )
        } else {
            conn.prepare(
                "SELECT session_id, tool, arguments, error, timestamp FROM tool_errors \
                 ORDER BY timestamp DESC LIMIT ?1",
            )
        }
        .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        let rows = if let Some(sid) = session_id {
            stmt.query_map(params![sid, limit as i64], Self::map_error_row)
        } else {
            stmt.query_map(params![limit as i64], Self::map_error_row)
        }
        .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn map_error_row(row: &rusqlite::Row) -> rusqlite::Result<ToolErrorRecord> {
        let arguments_json: String = row.get(2)?;
        let timestamp: String = row.get(4)?;
        Ok(ToolErrorRecord {
            session_id: row.get(0)?,
            tool: row.get(1)?,
            arguments: serde_json::from_str(&arguments_json).unwrap_or(serde_json::Value::Null),
            error: row.get(3)?,
            timestamp: parse_ts(&timestamp),
        })
    }

    pub async fn save_summary(
        &self,
        session_id: &str,
        original_messages: &[Message],
        summary_text: &str,
    ) -> Result<(), String> {
        let conn = self.pool.acquire().await?;
        let messages_json =
            serde_json::to_string(original_messages).map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        conn.execute(
            "INSERT INTO summaries (session_id, original_messages, summary_text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, messages_json, summary_text, Utc::now().to_rfc3339()],
        )
        .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn get_summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, String> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, original_messages, summary_text, timestamp FROM summaries \
                 WHERE session_id = ?1 ORDER BY timestamp ASC",
            )
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let messages_json: String = row.get(1)?;
                let timestamp: String = row.get(3)?;
                Ok((row.get::<_, String>(0)?, messages_json, row.get::<_, String>(2)?, timestamp))
            })
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?;

        Ok(rows
            .filter_map(|r| r.ok())
            .map(|(session_id, messages_json, summary_text, timestamp)| SummaryRecord {
                session_id,
                original_messages: serde_json::from_str(&messages_json).unwrap_or_default(),
                summary_text,
                timestamp: parse_ts(&timestamp),
            })
            .collect())
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::models::Message;

    fn make_store() -> Store {
        Store::in_memory(2).unwrap()
    }

    #[tokio::test]
    async fn save_and_get_history_round_trip() {
        let store = make_store();
        let messages = vec![
            Message::new("s1", Role::User, "hi"),
            Message::new("s1", Role::Assistant, "hello"),
        ];
        store.save_messages("s1", &messages).await.unwrap();

        let history = store.get_history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].content, "hello");
    }

    #[tokio::test]
    async fn save_messages_replaces_full_list() {
        let store = make_store();
        store
            .save_messages("s1", &[Message::new("s1", Role::User, "first")])
            .await
            .unwrap();
        store
            .save_messages("s1", &[Message::new("s1", Role::User, "second")])
            .await
            .unwrap();

        let history = store.get_history("s1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "second");
    }

    #[tokio::test]
    async fn get_all_sessions_aggregates_counts() {
        let store = make_store();
        store
            .save_messages(
                "s1",
                &[Message::new("s1", Role::User, "a"), Message::new("s1", Role::User, "b")],
            )
            .await
            .unwrap();
        store
            .save_messages("s2", &[Message::new("s2", Role::User, "c")])
            .await
            .unwrap();

        let sessions = store.get_all_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.session_id == "s1").unwrap();
        assert_eq!(s1.message_count, 2);
    }

    #[tokio::test]
    async fn save_and_get_recent_errors() {
        let store = make_store();
        store
            .save_error(Some("s1"), "nope", &serde_json::json!({}), "TOOL_NOT_FOUND")
            .await
            .unwrap();
        store
            .save_error(None, "echo", &serde_json::json!({"text": "x"}), "boom")
            .await
            .unwrap();

        let all_errors = store.get_recent_errors(10, None).await.unwrap();
        assert_eq!(all_errors.len(), 2);

        let scoped = store.get_recent_errors(10, Some("s1")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].tool, "nope");
    }

    #[tokio::test]
    async fn save_summary_is_append_only() {
        let store = make_store();
        let messages = vec![Message::new("s1", Role::User, "x".repeat(40))];
        store.save_summary("s1", &messages, "S").await.unwrap();
        store.save_summary("s1", &messages, "S").await.unwrap();

        let summaries = store.get_summaries("s1").await.unwrap();
        assert_eq!(summaries.len(), 2);
    }
}
