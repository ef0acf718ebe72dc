//! Black-box scenarios seeding the test suite (§8).

use std::collections::HashMap;
use std::sync::Arc;

use ape::dispatcher::{Dispatcher, ErrorCode};
use ape::memory::summarizer::{Summarize, SummarizeError};
use ape::memory::WindowMemory;
use ape::persistence::{Role, Store};
use ape::prompts::PromptRegistry;
use ape::ratelimit::RateLimiter;
use ape::registry::CapabilityRegistry;
use ape::signer::Signer;
use ape::tools::{EchoTool, SumTool};

const TEST_KEY: &str = "integration-test-key";

async fn dispatcher_with_store() -> (Dispatcher, Arc<Store>) {
    let dir = tempfile::tempdir().unwrap();
    let prompts = PromptRegistry::new(dir.path());
    prompts.ensure_defaults().unwrap();
    prompts.load().await.unwrap();

    let mut registry = CapabilityRegistry::new(prompts);
    registry.register_tool(Arc::new(EchoTool)).unwrap();
    registry.register_tool(Arc::new(SumTool)).unwrap();

    let store = Arc::new(Store::in_memory(2).unwrap());
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(Signer::new(TEST_KEY)),
        Arc::new(RateLimiter::new(60, 60)),
        store.clone(),
    );
    (dispatcher, store)
}

/// Scenario 1: Tool call happy path.
#[tokio::test]
async fn scenario_tool_call_happy_path() {
    let (dispatcher, _store) = dispatcher_with_store().await;

    let envelope = dispatcher
        .call_tool("session-1", "echo", serde_json::json!({"text": "hi"}), &HashMap::new())
        .await
        .expect("echo should succeed");

    let verified = Signer::new(TEST_KEY)
        .verify(&envelope, chrono_now_unix())
        .expect("envelope should verify");
    assert_eq!(verified["output"], "hi");
}

/// Scenario 2: Unknown tool.
#[tokio::test]
async fn scenario_unknown_tool_records_error() {
    let (dispatcher, store) = dispatcher_with_store().await;

    let err = dispatcher
        .call_tool("session-1", "nope", serde_json::json!({}), &HashMap::new())
        .await
        .expect_err("unknown tool should fail");
    assert!(err.error.starts_with(ErrorCode::ToolNotFound.as_str()));

    let errors = store.get_recent_errors(10, Some("session-1")).await.unwrap();
    assert!(errors.iter().any(|e| e.tool == "nope"));
}

/// Scenario 3: Argument filtering.
#[tokio::test]
async fn scenario_argument_filtering_drops_unknown_fields() {
    let (dispatcher, _store) = dispatcher_with_store().await;

    let envelope = dispatcher
        .call_tool("session-1", "sum", serde_json::json!({"a": 1, "b": 2, "c": 99}), &HashMap::new())
        .await
        .expect("sum should succeed");

    let verified = Signer::new(TEST_KEY).verify(&envelope, chrono_now_unix()).unwrap();
    assert_eq!(verified["output"], "3");
}

/// Scenario 4: Signature expiry.
#[tokio::test]
async fn scenario_expired_signature_is_rejected() {
    let (dispatcher, _store) = dispatcher_with_store().await;

    let envelope = dispatcher
        .call_tool("session-1", "echo", serde_json::json!({"text": "hi"}), &HashMap::new())
        .await
        .unwrap();

    let far_future = chrono_now_unix() + ape::signer::TTL_SECONDS + 1;
    let err = Signer::new(TEST_KEY).verify(&envelope, far_future).unwrap_err();
    assert_eq!(err.code(), "EXPIRED_SIGNATURE");
}

/// Scenario 5: Memory prune with a stub summariser.
#[tokio::test]
async fn scenario_memory_prune_keeps_tokens_under_budget() {
    struct StubSummarizer;
    #[async_trait::async_trait]
    impl Summarize for StubSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Ok("S".to_string())
        }
    }

    let store = Arc::new(Store::in_memory(2).unwrap());
    let mut memory = WindowMemory::new("session-1", 100, 10, false, store, Arc::new(StubSummarizer));

    for _ in 0..6 {
        memory.role_message(Role::User, "x".repeat(40));
        memory.prune().await;
        assert!(memory.tokens() <= 90 || memory.messages().is_empty());
    }

    assert!(memory.latest_context().matches('S').count() >= 1);
}

/// Scenario 6: Stagnation recovery.
#[tokio::test]
async fn scenario_stagnation_recovery_terminates_cleanly() {
    use ape::agent::{AgentConfig, AgentLoop};
    use ape::orchestrator::{Orchestrator, OrchestratorConfig};
    use ape::testing::MockProvider;

    let dir = tempfile::tempdir().unwrap();
    let prompts = PromptRegistry::new(dir.path());
    prompts.ensure_defaults().unwrap();
    prompts.load().await.unwrap();

    let mut registry = CapabilityRegistry::new(prompts);
    registry.register_tool(Arc::new(EchoTool)).unwrap();

    let store = Arc::new(Store::in_memory(2).unwrap());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(Signer::new("integration-test-key")),
        Arc::new(RateLimiter::new(60, 60)),
        store.clone(),
    ));

    struct StubSummarizer;
    #[async_trait::async_trait]
    impl Summarize for StubSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Ok("S".to_string())
        }
    }

    let memory = WindowMemory::new("agent-session", 8192, 1024, false, store, Arc::new(StubSummarizer));
    let provider = Arc::new(MockProvider::new(vec!["same".to_string()]));
    let agent = AgentLoop::new(
        provider,
        dispatcher,
        Arc::new(Signer::new("integration-test-key")),
        None,
        AgentConfig { agent_name: "stub-agent".to_string(), ..Default::default() },
        memory,
    );

    let mut orchestrator = Orchestrator::new(
        vec![agent],
        OrchestratorConfig { turns: 50, stagnation_threshold: 3, max_recoveries: 3 },
        None,
    );

    let transcript = orchestrator.run("Begin.").await.unwrap();
    // Each round of 3 identical replies triggers one recovery; after 3
    // recoveries the orchestrator stops well short of the 50-turn cap.
    assert!(transcript.len() < 50);
}

fn chrono_now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
