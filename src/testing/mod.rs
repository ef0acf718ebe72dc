//! Shared test doubles reused across the crate's test suites.
//!
//! Promoted from the agent loop's colocated test module so the dispatcher,
//! memory, and orchestrator suites can all drive a deterministic
//! [`LLMProvider`] without depending on a real model backend.

use async_trait::async_trait;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ai::provider::{LLMProvider, Result as AiResult, StreamResponse};
use crate::ai::types::{CompletionRequest, CompletionResponse, StreamChunk};

/// Cycles through a fixed list of canned responses, one per call to
/// `complete`/`stream`. Wraps around once exhausted so long-running loop
/// tests don't need to size the list exactly to the iteration count.
pub struct MockProvider {
    responses: Vec<String>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of times `complete`/`stream` has been called so far.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> String {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.responses.is_empty() {
            String::new()
        } else {
            self.responses[idx % self.responses.len()].clone()
        }
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, _request: CompletionRequest) -> AiResult<CompletionResponse> {
        Ok(CompletionResponse {
            content: self.next_response(),
            model: "mock".to_string(),
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> AiResult<StreamResponse> {
        let content = self.next_response();
        let chunk = StreamChunk {
            delta: content,
            is_final: true,
            finish_reason: Some("stop".to_string()),
        };
        Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
    }

    fn context_limit(&self) -> usize {
        8192
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
