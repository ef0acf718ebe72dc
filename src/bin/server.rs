//! Headless server entry point: loads configuration, wires the Capability
//! Registry / Dispatcher / Signer, and (when the `gateway` feature is
//! enabled) serves the HTTP façade over the dispatcher's MCP verbs.

use std::path::PathBuf;
use std::sync::Arc;

use ape::ai::providers::build_provider;
use ape::config::loader::{default_config_path, load_and_resolve};
use ape::dispatcher::Dispatcher;
use ape::memory::{SummarizeTool, Summarizer};
use ape::persistence::Store;
use ape::prompts::PromptRegistry;
use ape::ratelimit::RateLimiter;
use ape::registry::CapabilityRegistry;
use ape::resources::{ConversationResource, ErrorsResource, SchemaResource};
use ape::security::SecurityPolicy;
use ape::signer::Signer;
use ape::tools::register_builtin_tools;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ape-server", about = "Agentic Protocol Executor server")]
struct Args {
    /// Path to the TOML config file. Defaults to `$APE_CONFIG` or `./ape.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);

    let resolved = match load_and_resolve(&config_path) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    init_logging(&resolved.server.log_level);
    tracing::info!(port = resolved.server.port, config = %config_path.display(), "starting");

    let store = match Store::open(&resolved.persistence.session_db_path, resolved.persistence.pool_size) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("CONFIG_FATAL: failed to open session database: {e}");
            std::process::exit(1);
        }
    };

    let provider = match build_provider(&resolved.model) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("CONFIG_FATAL: failed to build model provider: {e}");
            std::process::exit(1);
        }
    };

    let prompts = PromptRegistry::new("prompts");
    if let Err(e) = prompts.ensure_defaults() {
        eprintln!("CONFIG_FATAL: failed to seed default prompts: {e}");
        std::process::exit(1);
    }
    if let Err(e) = prompts.load().await {
        eprintln!("CONFIG_FATAL: failed to load prompts: {e}");
        std::process::exit(1);
    }

    let mut registry = CapabilityRegistry::new(prompts);
    let summarizer = Arc::new(Summarizer::new(
        provider.clone(),
        resolved.memory.summary_max_tokens,
        resolved.memory.summarize_thoughts,
    ));
    let security_policy = Arc::new(SecurityPolicy::default_policy());
    register_builtin_tools(&mut registry, Arc::new(SummarizeTool::new(summarizer)), security_policy);
    registry.register_resource(Arc::new(ConversationResource::new(store.clone())));
    registry.register_resource(Arc::new(SchemaResource::new(store.clone())));
    registry.register_resource(Arc::new(ErrorsResource::new(store.clone())));

    let signer = Arc::new(Signer::new(resolved.jwt_key.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(60, 60));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), signer, rate_limiter, store));

    #[cfg(feature = "gateway")]
    {
        let router = ape::gateway::build_router(dispatcher);
        let addr = format!("0.0.0.0:{}", resolved.server.port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("CONFIG_FATAL: failed to bind {addr}: {e}");
                std::process::exit(1);
            }
        };
        tracing::info!(%addr, "gateway listening");
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("server error: {e}");
            std::process::exit(1);
        }
    }

    #[cfg(not(feature = "gateway"))]
    {
        let _ = dispatcher;
        eprintln!("gateway feature disabled; nothing to serve. Rebuild with --features gateway.");
        std::process::exit(1);
    }
}
