//! Summariser Tool (C6): compress a text block to at most `K` tokens (§4.6).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};

use crate::ai::context::ContextManager;
use crate::ai::provider::LLMProvider;
use crate::ai::types::CompletionRequest;
use crate::tools::{Tool, ToolResult};

pub const INPUT_LIMIT_TOKENS: usize = 4000;
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("INPUT_TOO_LARGE")]
    InputTooLarge,
}

/// Anything that can turn text into a bounded-length summary. Window Memory
/// holds this as a plain function-parameter-shaped handle rather than a
/// registry reference, to avoid the memory → registry → memory cycle the
/// summariser would otherwise create (§9 design note).
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;
}

fn strip_think_blocks(text: &str) -> String {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"(?s)<think>.*?</think>").unwrap();
    re.replace_all(text, "").to_string()
}

fn truncate_to_tokens(text: &str, ctx: &ContextManager, max_tokens: usize) -> String {
    if ctx.estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    // Sentence-by-sentence first.
    #[allow(clippy::unwrap_used)]
    let sentence_re = Regex::new(r"[^.!?]+[.!?]+").unwrap();
    let mut acc = String::new();
    for m in sentence_re.find_iter(text) {
        let candidate = format!("{acc}{}", m.as_str());
        if ctx.estimate_tokens(&candidate) > max_tokens {
            break;
        }
        acc = candidate;
    }
    if !acc.is_empty() {
        return acc.trim().to_string();
    }

    // Word-by-word fallback.
    let mut acc = String::new();
    for word in text.split_whitespace() {
        let candidate = if acc.is_empty() {
            word.to_string()
        } else {
            format!("{acc} {word}")
        };
        if ctx.estimate_tokens(&candidate) > max_tokens {
            break;
        }
        acc = candidate;
    }
    acc
}

/// Extractive fallback: leading sentences, in order, up to `max_tokens`.
fn extractive_summary(text: &str, ctx: &ContextManager, max_tokens: usize) -> String {
    truncate_to_tokens(text, ctx, max_tokens)
}

/// Model-backed summariser with a deterministic extractive fallback.
pub struct Summarizer {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
    summarize_thoughts: bool,
    ctx: ContextManager,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: usize, summarize_thoughts: bool) -> Self {
        Self {
            provider,
            max_tokens,
            summarize_thoughts,
            ctx: ContextManager::new(usize::MAX),
        }
    }

    async fn ask_model(&self, prompt: &str) -> Option<String> {
        let request = CompletionRequest::new(
            "summarize",
            vec![crate::ai::types::Message::user(prompt)],
        )
        .with_max_tokens((self.max_tokens * 4) as u32);

        match tokio::time::timeout(TIMEOUT, self.provider.complete(request)).await {
            Ok(Ok(response)) => Some(response.content),
            _ => None,
        }
    }
}

#[async_trait]
impl Summarize for Summarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let cleaned = if self.summarize_thoughts {
            text.to_string()
        } else {
            strip_think_blocks(text)
        };

        if self.ctx.estimate_tokens(&cleaned) > INPUT_LIMIT_TOKENS {
            return Err(SummarizeError::InputTooLarge);
        }

        let prompt = format!(
            "Summarise the following text in no more than {} tokens. Respond with only the summary.\n\n{cleaned}",
            self.max_tokens
        );

        if let Some(first) = self.ask_model(&prompt).await {
            if self.ctx.estimate_tokens(&first) <= self.max_tokens {
                return Ok(first);
            }

            let retry_prompt = format!(
                "Your previous summary was too long:\n\n{first}\n\nRewrite it in no more than {} tokens, strictly.",
                self.max_tokens
            );
            if let Some(second) = self.ask_model(&retry_prompt).await {
                if self.ctx.estimate_tokens(&second) <= self.max_tokens {
                    return Ok(second);
                }
                return Ok(truncate_to_tokens(&second, &self.ctx, self.max_tokens));
            }
            return Ok(truncate_to_tokens(&first, &self.ctx, self.max_tokens));
        }

        Ok(extractive_summary(&cleaned, &self.ctx, self.max_tokens))
    }
}

/// Exposes [`Summarizer`] as a registered tool, per C6's "registered tool"
/// framing (§2 component table).
pub struct SummarizeTool {
    summarizer: Arc<dyn Summarize>,
}

impl SummarizeTool {
    pub fn new(summarizer: Arc<dyn Summarize>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &str {
        "summarize"
    }

    fn description(&self) -> &str {
        "Compress a block of text into a short summary bounded by a token budget."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to summarise" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "VALIDATION_ERROR: missing required field `text`".to_string())?;

        match self.summarizer.summarize(text).await {
            Ok(summary) => Ok(ToolResult::ok(summary)),
            Err(SummarizeError::InputTooLarge) => Ok(ToolResult::err("INPUT_TOO_LARGE")),
        }
    }
}
