//! Resource adapter trait (§4.2 "Resource adapters").

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

/// Catalog entry for one `uri_pattern` an adapter serves.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceMeta {
    pub uri_pattern: String,
    pub name: String,
    pub description: String,
    pub mime_hint: String,
}

/// A source of `resources/read` content, matched against a URI pattern.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// registry alongside tools and prompts.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Glob patterns this adapter answers for, e.g. `"conversation://*"`.
    fn uri_patterns(&self) -> Vec<String>;

    /// Catalog entries surfaced by `resources/list`.
    fn catalog(&self) -> Vec<ResourceMeta>;

    /// Resolve `uri` (with `query` merged from the URI's own `?...` segment
    /// and any explicit query the caller passed) to `(mime_type, content)`.
    async fn read(&self, uri: &str, query: &HashMap<String, String>) -> Result<(String, String), String>;
}
