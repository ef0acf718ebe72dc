pub mod agent;
pub mod ai;
pub mod config;
pub mod dispatcher;
pub mod event_bus;
pub mod gateway;
pub mod memory;
pub mod orchestrator;
pub mod persistence;
pub mod prompts;
pub mod ratelimit;
pub mod registry;
pub mod resources;
pub mod security;
pub mod signer;
pub mod testing;
pub mod tools;

/// Convenience re-exports for the most commonly used traits and types across
/// this crate.
///
/// ```rust
/// use ape::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{AgentConfig, AgentLoop};
    pub use crate::ai::provider::LLMProvider;
    pub use crate::ai::types::{CompletionRequest, CompletionResponse, Message, MessageRole};
    pub use crate::config::{AppConfig, ResolvedConfig, load_and_resolve};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::event_bus::{AppEvent, EventBus, TokioBroadcastBus};
    pub use crate::memory::WindowMemory;
    pub use crate::orchestrator::Orchestrator;
    pub use crate::persistence::Store;
    pub use crate::ratelimit::RateLimiter;
    pub use crate::registry::CapabilityRegistry;
    pub use crate::security::SecurityPolicy;
    pub use crate::signer::Signer;
    pub use crate::tools::{Tool, ToolRegistry, ToolResult};
}
