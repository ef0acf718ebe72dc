//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse the config file at `path` (or [`AppConfig::default()`] if absent).
//! 2. Apply the literal environment variable overrides named in the external
//!    interface contract: `PORT`, `LOG_LEVEL`, `LLM_MODEL`, `OLLAMA_BASE_URL`,
//!    `TEMPERATURE`, `TOP_P`, `TOP_K`, `MAX_TOOLS_ITERATIONS`,
//!    `CONTEXT_MARGIN_TOKENS`, `SUMMARY_MAX_TOKENS`, `SUMMARIZE_THOUGHTS`,
//!    `MCP_JWT_KEY`, `SESSION_DB_PATH`.
//! 3. [`resolve`] validates the result, turning a missing `MCP_JWT_KEY` into a
//!    `CONFIG_FATAL` error rather than silently booting with an empty key.
//!
//! # Atomic save
//! Writes to `<path>.tmp` then renames onto `<path>`, matching the teacher's
//! config-writer pattern, so a crash mid-write never corrupts the file on disk.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use super::schema::AppConfig;

/// A resolved, validated configuration ready to drive the server.
///
/// Distinct from [`AppConfig`]: `jwt_key` here is a plain `String`, not an
/// `Option`, because [`resolve`] already rejected the missing-key case.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub inner: AppConfig,
    pub jwt_key: String,
}

impl std::ops::Deref for ResolvedConfig {
    type Target = AppConfig;
    fn deref(&self) -> &AppConfig {
        &self.inner
    }
}

/// Default config file path: `./ape.toml`, or `$APE_CONFIG` if set.
pub fn default_config_path() -> PathBuf {
    env::var("APE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ape.toml"))
}

/// Load [`AppConfig`] from `path`, falling back to defaults if the file does
/// not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load, override, and validate, producing a [`ResolvedConfig`] or a
/// `CONFIG_FATAL` error describing what is missing.
pub fn load_and_resolve(path: &Path) -> Result<ResolvedConfig, String> {
    let config = load_config(path)?;
    resolve(config)
}

/// Validate a loaded [`AppConfig`], rejecting fatal misconfiguration.
pub fn resolve(config: AppConfig) -> Result<ResolvedConfig, String> {
    let jwt_key = config
        .signer
        .jwt_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            "CONFIG_FATAL: MCP_JWT_KEY is not set (required for signed result transport)"
                .to_string()
        })?;

    Ok(ResolvedConfig {
        inner: config,
        jwt_key,
    })
}

/// Apply the literal environment variable overrides from the external
/// interface contract to `config`.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = env::var("PORT") {
        if let Ok(port) = v.parse::<u16>() {
            config.server.port = port;
        }
    }
    if let Ok(v) = env::var("LOG_LEVEL") {
        config.server.log_level = v;
    }
    if let Ok(v) = env::var("LLM_MODEL") {
        config.model.llm_model = v;
    }
    if let Ok(v) = env::var("OLLAMA_BASE_URL") {
        config.model.ollama_base_url = v;
    }
    if let Ok(v) = env::var("TEMPERATURE") {
        if let Ok(t) = v.parse::<f32>() {
            config.model.temperature = t;
        }
    }
    if let Ok(v) = env::var("TOP_P") {
        if let Ok(t) = v.parse::<f32>() {
            config.model.top_p = t;
        }
    }
    if let Ok(v) = env::var("TOP_K") {
        if let Ok(t) = v.parse::<u32>() {
            config.model.top_k = t;
        }
    }
    if let Ok(v) = env::var("MAX_TOOLS_ITERATIONS") {
        if let Ok(n) = v.parse::<usize>() {
            config.agent.max_tool_iterations = n;
        }
    }
    if let Ok(v) = env::var("CONTEXT_MARGIN_TOKENS") {
        if let Ok(n) = v.parse::<usize>() {
            config.memory.context_margin_tokens = n;
        }
    }
    if let Ok(v) = env::var("SUMMARY_MAX_TOKENS") {
        if let Ok(n) = v.parse::<usize>() {
            config.memory.summary_max_tokens = n;
        }
    }
    if let Ok(v) = env::var("SUMMARIZE_THOUGHTS") {
        config.memory.summarize_thoughts = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = env::var("MCP_JWT_KEY") {
        config.signer.jwt_key = Some(v);
    }
    if let Ok(v) = env::var("SESSION_DB_PATH") {
        config.persistence.session_db_path = v;
    }
}

/// Atomically save `config` to `path` (write to `<path>.tmp`, then rename).
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| format!("failed to serialise config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp config: {e}"))?;
    fs::rename(&tmp_path, path).map_err(|e| format!("failed to replace config file: {e}"))?;

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unsafe_code)] // env::set_var / remove_var are unsafe in Rust 2024; tests are single-threaded.
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[model]
llm_model = "mixtral"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.model.llm_model, "mixtral");
        assert_eq!(config.agent.max_tool_iterations, 15);
        assert_eq!(config.memory.summary_max_tokens, 128);
    }

    #[test]
    fn resolve_without_jwt_key_is_fatal() {
        let config = AppConfig::default();
        let err = resolve(config).unwrap_err();
        assert!(err.contains("CONFIG_FATAL"));
    }

    #[test]
    fn resolve_with_jwt_key_succeeds() {
        let mut config = AppConfig::default();
        config.signer.jwt_key = Some("secret".to_owned());
        let resolved = resolve(config).unwrap();
        assert_eq!(resolved.jwt_key, "secret");
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut original = AppConfig::default();
        original.model.llm_model = "llama3.1:70b".to_owned();
        original.persistence.session_db_path = "/tmp/ape.sqlite3".to_owned();

        save_config(&path, &original).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, original, "config should round-trip through save/load");
    }

    #[test]
    fn env_override_port_and_model() {
        // SAFETY: single-threaded test context; no other threads read these vars.
        unsafe {
            env::set_var("PORT", "9999");
            env::set_var("LLM_MODEL", "custom-model");
        }
        let config = load_config(&default_config_path()).unwrap_or_default();
        unsafe {
            env::remove_var("PORT");
            env::remove_var("LLM_MODEL");
        }
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.model.llm_model, "custom-model");
    }

    #[test]
    fn env_override_summarize_thoughts() {
        // SAFETY: single-threaded test context; no other threads read this var.
        unsafe {
            env::set_var("SUMMARIZE_THOUGHTS", "true");
        }
        let config = load_config(&default_config_path()).unwrap_or_default();
        unsafe {
            env::remove_var("SUMMARIZE_THOUGHTS");
        }
        assert!(config.memory.summarize_thoughts);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "this is not valid toml!!!");
        let result = load_config(&path);
        assert!(result.is_err(), "invalid TOML should return an error");
    }
}
