//! TOML configuration schema for the Agentic Protocol Executor.
//!
//! All fields have `#[serde(default)]` so a partially-filled `config.toml`
//! works correctly. Missing sections fall back to their `Default` impl.
//! The values in this schema mirror the configuration keys in the external
//! interface contract one-for-one; see [`super::loader`] for how the literal
//! environment variable names override the TOML values.
//!
//! Example `config.toml`:
//! ```toml
//! [server]
//! port = 8080
//! log_level = "info"
//!
//! [model]
//! llm_model = "llama3.1"
//! ollama_base_url = "http://localhost:11434"
//!
//! [agent]
//! max_tool_iterations = 15
//!
//! [memory]
//! summary_max_tokens = 128
//!
//! [signer]
//! jwt_key = "change-me"
//!
//! [persistence]
//! session_db_path = "ape.sqlite3"
//! ```

use serde::{Deserialize, Serialize};

// ─── ServerConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port the gateway binds to.
    pub port: u16,
    /// `tracing` `EnvFilter` directive, e.g. `"info"` or `"ape=debug,tower_http=warn"`.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_level: "info".to_owned(),
        }
    }
}

// ─── ModelConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier passed to the LLM provider.
    pub llm_model: String,
    /// Base URL of the Ollama-compatible HTTP endpoint.
    pub ollama_base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            llm_model: "llama3.1".to_owned(),
            ollama_base_url: "http://localhost:11434".to_owned(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

// ─── AgentConfig ───────────────────────────────────────────────────────────

/// Bounds on the agent reason/act loop (§4.8). Distinct from
/// [`crate::agent::loop_::AgentConfig`], which carries the resolved runtime
/// parameters derived from this config plus a few loop-local defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on tool-call iterations per turn (spec default 15).
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 15,
        }
    }
}

// ─── MemoryConfig ──────────────────────────────────────────────────────────

/// Window Memory (C7) and Summariser (C6) tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Minimum headroom, in tokens, kept free below `ctx_limit` after prune.
    pub context_margin_tokens: usize,
    /// Target length, in tokens, of a produced summary (`K`).
    pub summary_max_tokens: usize,
    /// When `false`, `<think>...</think>` blocks are stripped before
    /// summarisation.
    pub summarize_thoughts: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_margin_tokens: 1024,
            summary_max_tokens: 128,
            summarize_thoughts: false,
        }
    }
}

// ─── SignerConfig ──────────────────────────────────────────────────────────

/// HMAC key material for the Signed Result Transport (C3).
///
/// `jwt_key` has no default: a missing key is a `CONFIG_FATAL` startup error
/// (§7), never a silent empty-string fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SignerConfig {
    pub jwt_key: Option<String>,
}

// ─── PersistenceConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file backing history/tool-error/summary storage.
    pub session_db_path: String,
    /// Size of the bounded connection pool opened against `session_db_path`.
    pub pool_size: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            session_db_path: "ape.sqlite3".to_owned(),
            pool_size: 4,
        }
    }
}

// ─── AppConfig ─────────────────────────────────────────────────────────────

/// Top-level application configuration, loaded from a TOML file and then
/// overridden by the literal environment variables named in the external
/// interface contract (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub signer: SignerConfig,
    pub persistence: PersistenceConfig,
}
