use std::sync::Arc;

use crate::ai::provider::LLMProvider;
use crate::config::ModelConfig;

pub mod openai_compatible;

pub use openai_compatible::{OpenAICompatibleConfig, OpenAICompatibleProvider};

/// Build the concrete [`LLMProvider`] the server runs against, from the
/// resolved model configuration. The only backend wired up here is a
/// generic OpenAI-compatible HTTP client pointed at `OLLAMA_BASE_URL` — the
/// LLM backend itself is out of scope; this is the thin adapter at the
/// trait boundary (§D Non-goals).
pub fn build_provider(config: &ModelConfig) -> Result<Arc<dyn LLMProvider>, String> {
    let cfg = OpenAICompatibleConfig::ollama(&config.ollama_base_url, &config.llm_model);
    Ok(Arc::new(OpenAICompatibleProvider::new(cfg, "ollama")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_from_default_config() {
        let config = ModelConfig::default();
        let provider = build_provider(&config);
        assert!(provider.is_ok());
    }
}
