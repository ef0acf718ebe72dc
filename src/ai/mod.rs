pub mod context;
pub mod provider;
pub mod providers;
pub mod types;

pub use context::ContextManager;
pub use provider::{LLMProvider, ProviderFactory};
pub use providers::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use types::{CompletionRequest, CompletionResponse, Message, MessageRole, StreamChunk};
