//! Built-in resource adapters over the persistence store (§6 "Resource URI scheme").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::persistence::Store;

use super::traits::{ResourceAdapter, ResourceMeta};

fn query_limit(query: &HashMap<String, String>, default: usize) -> usize {
    query
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Serves `conversation://sessions`, `conversation://recent`, and
/// `conversation://<session_id>`.
pub struct ConversationResource {
    store: Arc<Store>,
}

impl ConversationResource {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceAdapter for ConversationResource {
    fn uri_patterns(&self) -> Vec<String> {
        vec!["conversation://*".to_string()]
    }

    fn catalog(&self) -> Vec<ResourceMeta> {
        vec![
            ResourceMeta {
                uri_pattern: "conversation://sessions".to_string(),
                name: "conversation-sessions".to_string(),
                description: "List of session summaries".to_string(),
                mime_hint: "application/json".to_string(),
            },
            ResourceMeta {
                uri_pattern: "conversation://recent".to_string(),
                name: "conversation-recent".to_string(),
                description: "Recent messages across all sessions".to_string(),
                mime_hint: "application/json".to_string(),
            },
            ResourceMeta {
                uri_pattern: "conversation://<session_id>".to_string(),
                name: "conversation-history".to_string(),
                description: "Full message history for one session".to_string(),
                mime_hint: "application/json".to_string(),
            },
        ]
    }

    async fn read(&self, uri: &str, query: &HashMap<String, String>) -> Result<(String, String), String> {
        let path = uri
            .strip_prefix("conversation://")
            .ok_or_else(|| "RESOURCE_NOT_FOUND: not a conversation:// uri".to_string())?;

        let body = match path {
            "sessions" => {
                let sessions = self.store.get_all_sessions().await?;
                serde_json::to_string(&sessions).map_err(|e| format!("STORAGE_ERROR: {e}"))?
            }
            "recent" => {
                let limit = query_limit(query, 50);
                let messages = self.store.get_recent_messages(limit).await?;
                serde_json::to_string(&messages).map_err(|e| format!("STORAGE_ERROR: {e}"))?
            }
            session_id => {
                let limit = query_limit(query, usize::MAX);
                let mut history = self.store.get_history(session_id).await?;
                if history.len() > limit {
                    let start = history.len() - limit;
                    history = history.split_off(start);
                }
                serde_json::to_string(&history).map_err(|e| format!("STORAGE_ERROR: {e}"))?
            }
        };

        Ok(("application/json".to_string(), body))
    }
}

/// Serves `schema://tables` and `schema://<table>/columns`.
pub struct SchemaResource {
    store: Arc<Store>,
}

impl SchemaResource {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceAdapter for SchemaResource {
    fn uri_patterns(&self) -> Vec<String> {
        vec!["schema://*".to_string()]
    }

    fn catalog(&self) -> Vec<ResourceMeta> {
        vec![
            ResourceMeta {
                uri_pattern: "schema://tables".to_string(),
                name: "schema-tables".to_string(),
                description: "Database table names".to_string(),
                mime_hint: "application/json".to_string(),
            },
            ResourceMeta {
                uri_pattern: "schema://<table>/columns".to_string(),
                name: "schema-columns".to_string(),
                description: "Column metadata for one table".to_string(),
                mime_hint: "application/json".to_string(),
            },
        ]
    }

    async fn read(&self, uri: &str, _query: &HashMap<String, String>) -> Result<(String, String), String> {
        let path = uri
            .strip_prefix("schema://")
            .ok_or_else(|| "RESOURCE_NOT_FOUND: not a schema:// uri".to_string())?;

        let body = if path == "tables" {
            let tables = self.store.list_tables().await?;
            serde_json::to_string(&tables).map_err(|e| format!("STORAGE_ERROR: {e}"))?
        } else if let Some(table) = path.strip_suffix("/columns") {
            let columns = self.store.table_columns(table).await?;
            serde_json::to_string(&columns).map_err(|e| format!("STORAGE_ERROR: {e}"))?
        } else {
            return Err(format!("RESOURCE_NOT_FOUND: {uri}"));
        };

        Ok(("application/json".to_string(), body))
    }
}

/// Serves `errors://recent`.
pub struct ErrorsResource {
    store: Arc<Store>,
}

impl ErrorsResource {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceAdapter for ErrorsResource {
    fn uri_patterns(&self) -> Vec<String> {
        vec!["errors://*".to_string()]
    }

    fn catalog(&self) -> Vec<ResourceMeta> {
        vec![ResourceMeta {
            uri_pattern: "errors://recent".to_string(),
            name: "errors-recent".to_string(),
            description: "Recently recorded tool errors".to_string(),
            mime_hint: "application/json".to_string(),
        }]
    }

    async fn read(&self, uri: &str, query: &HashMap<String, String>) -> Result<(String, String), String> {
        if uri.strip_prefix("errors://") != Some("recent") {
            return Err(format!("RESOURCE_NOT_FOUND: {uri}"));
        }
        let limit = query_limit(query, 50);
        let session_id = query.get("session_id").map(|s| s.as_str());
        let errors = self.store.get_recent_errors(limit, session_id).await?;
        let body = serde_json::to_string(&errors).map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        Ok(("application/json".to_string(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Message, Role};

    async fn seeded_store() -> Arc<Store> {
        let store = Arc::new(Store::in_memory(2).unwrap());
        store
            .save_messages("s1", &[Message::new("s1", Role::User, "hi")])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn conversation_sessions_lists_session() {
        let store = seeded_store().await;
        let adapter = ConversationResource::new(store);
        let (mime, body) = adapter.read("conversation://sessions", &HashMap::new()).await.unwrap();
        assert_eq!(mime, "application/json");
        assert!(body.contains("s1"));
    }

    #[tokio::test]
    async fn conversation_session_history_reads_back_messages() {
        let store = seeded_store().await;
        let adapter = ConversationResource::new(store);
        let (_, body) = adapter.read("conversation://s1", &HashMap::new()).await.unwrap();
        assert!(body.contains("\"hi\""));
    }

    #[tokio::test]
    async fn schema_tables_lists_known_tables() {
        let store = seeded_store().await;
        let adapter = SchemaResource::new(store);
        let (_, body) = adapter.read("schema://tables", &HashMap::new()).await.unwrap();
        assert!(body.contains("history"));
        assert!(body.contains("tool_errors"));
    }

    #[tokio::test]
    async fn schema_columns_reads_named_table() {
        let store = seeded_store().await;
        let adapter = SchemaResource::new(store);
        let (_, body) = adapter.read("schema://history/columns", &HashMap::new()).await.unwrap();
        assert!(body.contains("session_id"));
    }

    #[tokio::test]
    async fn errors_recent_returns_recorded_errors() {
        let store = seeded_store().await;
        store
            .save_error(None, "nope", &serde_json::json!({}), "TOOL_NOT_FOUND")
            .await
            .unwrap();
        let adapter = ErrorsResource::new(store);
        let (_, body) = adapter.read("errors://recent", &HashMap::new()).await.unwrap();
        assert!(body.contains("nope"));
    }
}
