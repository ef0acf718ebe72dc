//! Capability Registry (C2): the unified home for tool, prompt, and resource
//! entries, plus discovery (§4.2).
//!
//! Grounded on the teacher's `tools::registry::ToolRegistry` — a flat
//! `HashMap<String, Arc<dyn Tool>>` built once at startup — generalised here
//! to also hold the prompt registry and a list of resource adapters matched
//! by glob pattern.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::prompts::{PromptRegistry, PromptTemplate};
use crate::resources::{ResourceAdapter, ResourceMeta};
use crate::tools::{Tool, ToolInfo, ToolProfile, ToolRegistry};

/// Process-wide mapping from capability name to entry (§3 "Registry State").
/// Tools and prompts are populated once at startup; resource adapters are
/// matched dynamically by URI pattern.
pub struct CapabilityRegistry {
    tools: ToolRegistry,
    prompts: Arc<PromptRegistry>,
    resources: Vec<Arc<dyn ResourceAdapter>>,
}

/// A tool name collided with one already registered — fatal at startup (§3).
#[derive(Debug, thiserror::Error)]
#[error("duplicate tool registration: {0}")]
pub struct DuplicateToolError(pub String);

impl CapabilityRegistry {
    pub fn new(prompts: Arc<PromptRegistry>) -> Self {
        Self {
            tools: ToolRegistry::new(),
            prompts,
            resources: Vec::new(),
        }
    }

    /// Register a tool, rejecting a name collision outright (§3 invariant:
    /// "duplicate registration is a fatal startup error").
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), DuplicateToolError> {
        if self.tools.get(tool.name()).is_some() {
            return Err(DuplicateToolError(tool.name().to_string()));
        }
        self.tools.register(tool);
        Ok(())
    }

    pub fn register_resource(&mut self, adapter: Arc<dyn ResourceAdapter>) {
        self.resources.push(adapter);
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// List the catalog, optionally filtered to a [`ToolProfile`] (§B "tool
    /// profiles"). `None` returns the full catalog — callers that never pass a
    /// profile see exactly the behavior spec.md describes.
    pub fn list_tools(&self, profile: Option<ToolProfile>) -> Vec<ToolInfo> {
        match profile {
            Some(profile) => self.tools.list_filtered(profile),
            None => self.tools.list(),
        }
    }

    pub async fn get_prompt(&self, name: &str) -> Option<PromptTemplate> {
        self.prompts.get(name).await
    }

    pub async fn list_prompts(&self) -> Vec<PromptTemplate> {
        self.prompts.list().await
    }

    pub fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    pub fn list_resources(&self) -> Vec<ResourceMeta> {
        self.resources.iter().flat_map(|a| a.catalog()).collect()
    }

    /// Resolve `uri` to the first registered adapter whose pattern matches,
    /// compiling `*` to `.*` (§4.2).
    pub fn find_resource_adapter(&self, uri: &str) -> Option<Arc<dyn ResourceAdapter>> {
        self.resources
            .iter()
            .find(|adapter| adapter.uri_patterns().iter().any(|p| glob_matches(p, uri)))
            .cloned()
    }
}

fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    match Regex::new(&format!("^{escaped}$")) {
        Ok(re) => re.is_match(candidate),
        Err(_) => pattern == candidate,
    }
}

/// Split `uri` on its first `?` into `(path, query)`, parsing `query` as
/// `key=value` pairs joined by `&` (§4.5 placeholder/query handling).
pub fn parse_uri_query(uri: &str) -> (&str, HashMap<String, String>) {
    match uri.split_once('?') {
        None => (uri, HashMap::new()),
        Some((path, qs)) => {
            let query = qs
                .split('&')
                .filter_map(|kv| kv.split_once('='))
                .map(|(k, v)| (k.to_string(), urlencoding::decode(v).map(|s| s.into_owned()).unwrap_or_else(|_| v.to_string())))
                .collect();
            (path, query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::tools::ToolResult;

    struct DummyTool(&'static str);

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "dummy"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult, String> {
            Ok(ToolResult::ok("done"))
        }
    }

    fn empty_registry() -> CapabilityRegistry {
        let dir = tempfile::tempdir().unwrap();
        CapabilityRegistry::new(PromptRegistry::new(dir.path()))
    }

    #[test]
    fn duplicate_tool_registration_is_rejected() {
        let mut registry = empty_registry();
        registry.register_tool(Arc::new(DummyTool("echo"))).unwrap();
        let err = registry.register_tool(Arc::new(DummyTool("echo"))).unwrap_err();
        assert_eq!(err.0, "echo");
    }

    #[test]
    fn glob_matches_wildcard_suffix() {
        assert!(glob_matches("conversation://*", "conversation://sessions"));
        assert!(!glob_matches("conversation://*", "schema://tables"));
    }

    #[test]
    fn parse_uri_query_splits_and_decodes() {
        let (path, query) = parse_uri_query("conversation://recent?limit=5&session_id=abc%20c");
        assert_eq!(path, "conversation://recent");
        assert_eq!(query.get("limit").map(String::as_str), Some("5"));
        assert_eq!(query.get("session_id").map(String::as_str), Some("abc c"));
    }

    #[test]
    fn parse_uri_query_without_query_string() {
        let (path, query) = parse_uri_query("conversation://sessions");
        assert_eq!(path, "conversation://sessions");
        assert!(query.is_empty());
    }
}
