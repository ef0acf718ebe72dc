//! Window Memory (C7): bounded conversation history with spill-to-summary
//! on overflow (§4.7).

use std::sync::Arc;

use crate::ai::context::ContextManager;
use crate::memory::summarizer::Summarize;
use crate::persistence::{Message, Role, Store};

/// Minimum headroom kept below `ctx_limit` (§4.7: "margin ... ≥1024 tokens").
pub const MIN_MARGIN_TOKENS: usize = 1024;

const PLACEHOLDER_SUMMARY: &str = "(no prior context)";

fn strip_think_blocks(text: &str) -> String {
    #[allow(clippy::unwrap_used)]
    let re = regex::Regex::new(r"(?s)<think>.*?</think>").unwrap();
    re.replace_all(text, "").to_string()
}

/// Per-agent bounded conversation buffer. Never shared across agents (§5).
pub struct WindowMemory {
    session_id: String,
    messages: Vec<Message>,
    summary: String,
    ctx_limit: usize,
    margin: usize,
    summarize_thoughts: bool,
    store: Arc<Store>,
    summarizer: Arc<dyn Summarize>,
    ctx: ContextManager,
}

impl WindowMemory {
    pub fn new(
        session_id: impl Into<String>,
        ctx_limit: usize,
        margin: usize,
        summarize_thoughts: bool,
        store: Arc<Store>,
        summarizer: Arc<dyn Summarize>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            summary: String::new(),
            ctx_limit,
            margin: margin.max(MIN_MARGIN_TOKENS),
            summarize_thoughts,
            store,
            summarizer,
            ctx: ContextManager::new(usize::MAX),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn tokens(&self) -> usize {
        let message_tokens: usize = self.messages.iter().map(|m| self.ctx.estimate_tokens(&m.content)).sum();
        message_tokens + self.ctx.estimate_tokens(&self.summary)
    }

    fn budget(&self) -> usize {
        self.ctx_limit.saturating_sub(self.margin)
    }

    /// Evict the oldest messages into the cumulative summary until the
    /// buffer fits the budget, or summarisation fails/returns empty (in
    /// which case the pre-summarisation buffer is preserved untouched).
    pub async fn prune(&mut self) {
        while self.tokens() > self.budget() && !self.messages.is_empty() {
            let take = (self.messages.len() / 4).max(1).min(self.messages.len());
            let chosen: Vec<Message> = self.messages[..take].to_vec();

            let mut concatenated = chosen
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            if !self.summarize_thoughts {
                concatenated = strip_think_blocks(&concatenated);
            }

            let summary_text = match self.summarizer.summarize(&concatenated).await {
                Ok(text) if !text.trim().is_empty() => text,
                _ => break,
            };

            if self
                .store
                .save_summary(&self.session_id, &chosen, &summary_text)
                .await
                .is_err()
            {
                // Storage refused the write: preserve the buffer, abort (§7).
                break;
            }

            self.messages.drain(..take);
            if self.summary.is_empty() {
                self.summary = summary_text;
            } else {
                self.summary = format!("{}\n{}", self.summary, summary_text);
            }
        }
    }

    /// Unconditionally summarise the entire buffer and clear it (used for
    /// stagnation recovery, §4.9).
    pub async fn force_summarize(&mut self) {
        if self.messages.is_empty() {
            return;
        }

        let mut concatenated = self
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !self.summarize_thoughts {
            concatenated = strip_think_blocks(&concatenated);
        }

        if let Ok(summary_text) = self.summarizer.summarize(&concatenated).await {
            if !summary_text.trim().is_empty() {
                let _ = self
                    .store
                    .save_summary(&self.session_id, &self.messages, &summary_text)
                    .await;
                self.summary = if self.summary.is_empty() {
                    summary_text
                } else {
                    format!("{}\n{}", self.summary, summary_text)
                };
            }
        }

        self.messages.clear();
    }

    pub fn latest_context(&self) -> String {
        if self.summary.is_empty() {
            PLACEHOLDER_SUMMARY.to_string()
        } else {
            self.summary.clone()
        }
    }

    pub fn role_message(&mut self, role: Role, content: impl Into<String>) {
        self.add(Message::new(self.session_id.clone(), role, content));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::summarizer::SummarizeError;
    use async_trait::async_trait;

    struct StubSummarizer(String);

    #[async_trait]
    impl Summarize for StubSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarize for FailingSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Ok(String::new())
        }
    }

    fn memory_with(summarizer: Arc<dyn Summarize>, ctx_limit: usize, margin: usize) -> WindowMemory {
        let store = Arc::new(Store::in_memory(2).unwrap());
        WindowMemory::new("s1", ctx_limit, margin, false, store, summarizer)
    }

    #[tokio::test]
    async fn prune_keeps_tokens_under_budget() {
        let mut memory = memory_with(Arc::new(StubSummarizer("S".to_string())), 5000, 10);
        for _ in 0..10 {
            memory.role_message(Role::User, "x".repeat(4000));
        }
        memory.prune().await;
        assert!(memory.tokens() <= memory.budget() || memory.messages.is_empty());
    }

    #[tokio::test]
    async fn prune_never_drops_messages_on_summarizer_failure() {
        let mut memory = memory_with(Arc::new(FailingSummarizer), 50, MIN_MARGIN_TOKENS);
        for _ in 0..5 {
            memory.role_message(Role::User, "x".repeat(40));
        }
        let before = memory.messages().len();
        memory.prune().await;
        assert_eq!(memory.messages().len(), before, "no data loss on summarise failure");
    }

    #[tokio::test]
    async fn force_summarize_clears_buffer() {
        let mut memory = memory_with(Arc::new(StubSummarizer("S".to_string())), 2000, 10);
        memory.role_message(Role::User, "hello");
        memory.force_summarize().await;
        assert!(memory.messages().is_empty());
        assert!(memory.latest_context().contains('S'));
    }

    #[tokio::test]
    async fn latest_context_returns_placeholder_when_empty() {
        let memory = memory_with(Arc::new(StubSummarizer("S".to_string())), 2000, 10);
        assert_eq!(memory.latest_context(), PLACEHOLDER_SUMMARY);
    }

    #[tokio::test]
    async fn prune_is_idempotent() {
        let mut memory = memory_with(Arc::new(StubSummarizer("S".to_string())), 5000, 10);
        for _ in 0..10 {
            memory.role_message(Role::User, "x".repeat(4000));
        }
        memory.prune().await;
        let tokens_after_first = memory.tokens();
        memory.prune().await;
        assert_eq!(memory.tokens(), tokens_after_first);
    }
}
