//! Row types for the persistence layer (§3 DATA MODEL / §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message's speaker, per §3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One entry in a conversation. Created by the agent loop; never mutated;
/// deleted only by explicit session purge (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Base64-encoded image payloads, if any were attached.
    pub images: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            images: None,
            timestamp: Utc::now(),
        }
    }
}

/// A session's aggregate view, returned by `get_all_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: i64,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
}

/// One row per summarisation event; append-only audit trail (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub session_id: String,
    pub original_messages: Vec<Message>,
    pub summary_text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of a failed tool call, exposed via `errors://recent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolErrorRecord {
    pub session_id: Option<String>,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}
