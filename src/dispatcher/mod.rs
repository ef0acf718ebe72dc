//! Server Dispatcher (C5): the MCP verb surface over the Capability
//! Registry, the Signer, and the Rate Limiter (§4.5, §6).
//!
//! Grounded on the teacher's `gateway/routes.rs` request-handling shape and
//! `tools/registry.rs` lookup pattern, generalised to the full MCP verb set
//! and the signed-envelope response contract.

pub mod errors;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::persistence::Store;
use crate::prompts::PromptTemplate;
use crate::ratelimit::RateLimiter;
use crate::registry::{CapabilityRegistry, parse_uri_query};
use crate::resources::ResourceMeta;
use crate::signer::{SignedEnvelope, Signer};
use crate::tools::{ToolInfo, ToolProfile};

pub use errors::{ErrorCode, ErrorEnvelope};

/// MIME types an agent-side `resources/read` caller is allowed to consume (§6).
const MIME_WHITELIST: &[&str] = &["application/json", "text/plain", "text/markdown"];
/// Resource payload size cap, in bytes (§6).
const RESOURCE_SIZE_CAP: usize = 64 * 1024;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Server capabilities returned from `initialize` (§6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerCapabilities {
    pub tools: usize,
    pub prompts: usize,
    pub resources: usize,
}

/// Classify a `Tool::execute` `Err(String)` (or a failed `ToolResult::output`)
/// into a stable error code, preserving a handler's own structured prefix
/// (e.g. `"VALIDATION_ERROR: ..."`, `"INPUT_TOO_LARGE"`) instead of always
/// collapsing it to `TOOL_EXECUTION_ERROR`.
fn classify_failure(message: &str) -> (ErrorCode, String) {
    let known = [
        ("VALIDATION_ERROR", ErrorCode::ValidationError),
        ("TOOL_EXECUTION_ERROR", ErrorCode::ToolExecutionError),
        ("SQL_ERROR", ErrorCode::SqlError),
        ("STORAGE_ERROR", ErrorCode::SqlError),
        ("SIGNATURE_ERROR", ErrorCode::SignatureError),
        ("RATE_LIMIT_EXCEEDED", ErrorCode::RateLimitExceeded),
        ("INPUT_TOO_LARGE", ErrorCode::InputTooLarge),
        ("PROMPT_NOT_FOUND", ErrorCode::PromptNotFound),
    ];
    for (prefix, code) in known {
        if let Some(rest) = message.strip_prefix(prefix) {
            let detail = rest.trim_start_matches(':').trim();
            return (code, if detail.is_empty() { message.to_string() } else { detail.to_string() });
        }
    }
    (ErrorCode::ToolExecutionError, message.to_string())
}

/// Replace any top-level string argument that exactly matches a known
/// placeholder name with its bound value (§4.5 "placeholder substitution"),
/// e.g. an argument `"retrieved_session_id"` resolved from an earlier tool
/// call's output bound into the caller's context.
fn substitute_placeholders(arguments: &Value, bound_context: &HashMap<String, String>) -> Value {
    let Some(object) = arguments.as_object() else {
        return arguments.clone();
    };
    if bound_context.is_empty() {
        return arguments.clone();
    }

    let mut substituted = serde_json::Map::new();
    for (key, value) in object {
        let resolved = match value.as_str().and_then(|s| bound_context.get(s)) {
            Some(bound) => Value::String(bound.clone()),
            None => value.clone(),
        };
        substituted.insert(key.clone(), resolved);
    }
    Value::Object(substituted)
}

/// Validate `arguments` against `schema`'s `properties`/`required`, dropping
/// any key the schema doesn't declare (§4.5 "argument schema-filtering").
fn filter_arguments(schema: &Value, arguments: &Value) -> Result<Value, String> {
    let properties = schema.get("properties").and_then(|p| p.as_object());
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    let provided = arguments.as_object().cloned().unwrap_or_default();

    for name in &required {
        if !provided.contains_key(*name) {
            return Err(format!("VALIDATION_ERROR: missing required field `{name}`"));
        }
    }

    let Some(properties) = properties else {
        return Ok(Value::Object(provided));
    };

    let mut filtered = serde_json::Map::new();
    for (key, value) in provided {
        if properties.contains_key(&key) {
            filtered.insert(key, value);
        }
    }
    Ok(Value::Object(filtered))
}

/// Wraps the Capability Registry, Signer, Rate Limiter, and persistence
/// store behind the MCP verb set. One instance serves every session.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    signer: Arc<Signer>,
    rate_limiter: Arc<RateLimiter>,
    store: Arc<Store>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        signer: Arc<Signer>,
        rate_limiter: Arc<RateLimiter>,
        store: Arc<Store>,
    ) -> Self {
        Self { registry, signer, rate_limiter, store }
    }

    pub fn initialize(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: self.registry.list_tools(None).len(),
            prompts: 0,
            resources: self.registry.list_resources().len(),
        }
    }

    /// `tools/list`, optionally filtered to a [`ToolProfile`] (§B "tool
    /// profiles"). `None` returns the full catalog.
    pub fn list_tools(&self, profile: Option<ToolProfile>) -> Vec<ToolInfo> {
        self.registry.list_tools(profile)
    }

    /// `tools/call(name, arguments)`. Enforces the rate limiter, placeholder
    /// substitution, schema filtering, and signs the successful result
    /// (§4.5, §6). `bound_context` resolves placeholder argument values
    /// (e.g. `retrieved_session_id`) bound by the caller from earlier turns;
    /// pass an empty map when no such context exists.
    pub async fn call_tool(
        &self,
        session_id: &str,
        name: &str,
        arguments: Value,
        bound_context: &HashMap<String, String>,
    ) -> Result<SignedEnvelope, ErrorEnvelope> {
        if !self.rate_limiter.allow(session_id) {
            return Err(ErrorEnvelope::new(ErrorCode::RateLimitExceeded, "rate limit exceeded", name, arguments));
        }

        let Some(tool) = self.registry.get_tool(name) else {
            return Err(ErrorEnvelope::new(ErrorCode::ToolNotFound, format!("unknown tool `{name}`"), name, arguments));
        };

        let arguments = substitute_placeholders(&arguments, bound_context);
        let filtered = match filter_arguments(&tool.parameters_schema(), &arguments) {
            Ok(v) => v,
            Err(e) => {
                let (code, detail) = classify_failure(&e);
                return Err(ErrorEnvelope::new(code, detail, name, arguments));
            }
        };

        match tool.execute(filtered.clone()).await {
            Ok(result) if result.success => {
                let payload = serde_json::json!({
                    "output": result.output,
                    "success": true,
                    "metadata": result.metadata,
                });
                self.signer
                    .sign(payload, now_unix())
                    .map_err(|e| ErrorEnvelope::new(ErrorCode::SignatureError, e.to_string(), name, filtered.clone()))
            }
            Ok(result) => {
                let (code, detail) = classify_failure(&result.output);
                self.record_error(session_id, name, &filtered, &detail).await;
                Err(ErrorEnvelope::new(code, detail, name, filtered))
            }
            Err(e) => {
                let (code, detail) = classify_failure(&e);
                self.record_error(session_id, name, &filtered, &detail).await;
                Err(ErrorEnvelope::new(code, detail, name, filtered))
            }
        }
    }

    async fn record_error(&self, session_id: &str, tool: &str, arguments: &Value, detail: &str) {
        if let Err(e) = self.store.save_error(Some(session_id), tool, arguments, detail).await {
            tracing::warn!(tool, error = %e, "failed to record tool error");
        }
    }

    pub async fn list_prompts(&self) -> Vec<PromptTemplate> {
        self.registry.list_prompts().await
    }

    /// `prompts/get(name, arguments?)`.
    pub async fn get_prompt(&self, name: &str, arguments: HashMap<String, String>) -> Result<String, ErrorEnvelope> {
        self.registry
            .prompts()
            .render(name, &arguments)
            .await
            .map_err(|e| {
                let (code, detail) = classify_failure(&e);
                ErrorEnvelope::new(code, detail, name, serde_json::to_value(arguments).unwrap_or(Value::Null))
            })
    }

    pub fn list_resources(&self) -> Vec<ResourceMeta> {
        self.registry.list_resources()
    }

    /// `resources/read(uri)`. Enforces the MIME whitelist and the 64 KiB
    /// payload cap (§6).
    pub async fn read_resource(&self, uri: &str) -> Result<(String, String), ErrorEnvelope> {
        let (path, query) = parse_uri_query(uri);
        let Some(adapter) = self.registry.find_resource_adapter(path) else {
            return Err(ErrorEnvelope::new(ErrorCode::ToolNotFound, format!("no adapter for `{uri}`"), uri, Value::Null));
        };

        let (mime, content) = adapter
            .read(path, &query)
            .await
            .map_err(|e| {
                let (code, detail) = classify_failure(&e);
                ErrorEnvelope::new(code, detail, uri, Value::Null)
            })?;

        if !MIME_WHITELIST.contains(&mime.as_str()) {
            return Err(ErrorEnvelope::new(ErrorCode::ValidationError, format!("disallowed mime type `{mime}`"), uri, Value::Null));
        }
        if content.len() > RESOURCE_SIZE_CAP {
            return Err(ErrorEnvelope::new(ErrorCode::ValidationError, "resource payload exceeds 64 KiB cap", uri, Value::Null));
        }

        Ok((mime, content))
    }
}
