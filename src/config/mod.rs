//! Typed configuration schema, TOML loading, and environment overrides.

pub mod loader;
pub mod schema;

pub use loader::{
    default_config_path, load_and_resolve, load_config, resolve, save_config, ResolvedConfig,
};
pub use schema::{
    AgentConfig, AppConfig, MemoryConfig, ModelConfig, PersistenceConfig, ServerConfig,
    SignerConfig,
};
