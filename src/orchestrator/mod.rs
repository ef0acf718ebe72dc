//! Multi-agent Orchestrator (C9): runs N cooperating agents exchanging
//! messages in rounds, detecting and recovering from conversational
//! stagnation (§4.9).
//!
//! Grounded on the teacher's `agents::orchestrator` round-coordination shape,
//! adapted from its parallel-fan-out execution model to the round-robin
//! relay this spec calls for: agent `i` receives the previous agent's reply
//! (private-reasoning blocks stripped) and produces the next input.

use std::sync::Arc;

use crate::agent::AgentLoop;
use crate::event_bus::{AppEvent, EventBus};

const REDIRECT_MESSAGE: &str = "Let's take this conversation in a new direction.";

fn strip_think_blocks(text: &str) -> String {
    #[allow(clippy::unwrap_used)]
    let re = regex::Regex::new(r"(?s)<think>.*?</think>").unwrap();
    re.replace_all(text, "").to_string()
}

/// Lowercase, whitespace-collapse, and reasoning-strip a reply for
/// stagnation comparison (§4.9).
fn normalize(text: &str) -> String {
    strip_think_blocks(text).split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Tunables for one orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Total number of turns to run, cycling through agents round-robin.
    pub turns: usize,
    /// Consecutive identical normalised replies from the same agent that
    /// count as stagnation (spec default 3).
    pub stagnation_threshold: usize,
    /// Recoveries allowed before the orchestrator gives up (spec default 3).
    pub max_recoveries: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { turns: 20, stagnation_threshold: 3, max_recoveries: 3 }
    }
}

/// One line of the produced transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub agent_name: String,
    pub message: String,
}

/// Runs `config.turns` rounds across `agents`, feeding each agent's reply
/// (reasoning stripped) to the next agent in round-robin order.
pub struct Orchestrator {
    agents: Vec<AgentLoop>,
    config: OrchestratorConfig,
    bus: Option<Arc<dyn EventBus>>,
}

impl Orchestrator {
    pub fn new(agents: Vec<AgentLoop>, config: OrchestratorConfig, bus: Option<Arc<dyn EventBus>>) -> Self {
        Self { agents, config, bus }
    }

    /// Run the conversation to completion (either `turns` rounds elapse, or
    /// `max_recoveries` stagnation recoveries are exhausted).
    ///
    /// Callers are responsible for closing MCP connections, the storage
    /// pool, and flushing logs once this returns (§4.9 "Shutdown") — the
    /// orchestrator itself owns none of those resources.
    pub async fn run(&mut self, opening_message: &str) -> Result<Vec<TranscriptEntry>, String> {
        let agent_count = self.agents.len();
        if agent_count == 0 {
            return Err("orchestrator requires at least one agent".to_string());
        }

        let mut transcript = Vec::with_capacity(self.config.turns);
        let mut next_input = opening_message.to_string();
        let mut last_normalized: Vec<Option<String>> = vec![None; agent_count];
        let mut repeat_counts: Vec<usize> = vec![0; agent_count];
        let mut recovery_count = 0usize;

        for turn in 0..self.config.turns {
            let agent_index = turn % agent_count;
            let input = strip_think_blocks(&next_input);

            let reply = self.agents[agent_index].run(&input, None).await?;
            let agent_name = self.agents[agent_index].agent_name().to_string();
            transcript.push(TranscriptEntry { agent_name, message: reply.clone() });

            let normalized = normalize(&reply);
            if last_normalized[agent_index].as_deref() == Some(normalized.as_str()) {
                repeat_counts[agent_index] += 1;
            } else {
                repeat_counts[agent_index] = 1;
                last_normalized[agent_index] = Some(normalized);
            }

            if repeat_counts[agent_index] >= self.config.stagnation_threshold {
                recovery_count += 1;
                if let Some(bus) = &self.bus {
                    let _ = bus.publish(AppEvent::OrchestratorRecovery { recovery_count });
                }
                if recovery_count >= self.config.max_recoveries {
                    break;
                }

                for agent in &mut self.agents {
                    agent.memory_mut().force_summarize().await;
                }
                last_normalized = vec![None; agent_count];
                repeat_counts = vec![0; agent_count];
                next_input = REDIRECT_MESSAGE.to_string();
                continue;
            }

            next_input = reply;
        }

        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::memory::summarizer::{Summarize, SummarizeError};
    use crate::memory::WindowMemory;
    use crate::persistence::Store;
    use crate::prompts::PromptRegistry;
    use crate::ratelimit::RateLimiter;
    use crate::registry::CapabilityRegistry;
    use crate::signer::Signer;
    use crate::testing::MockProvider;
    use crate::tools::EchoTool;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubSummarizer;
    #[async_trait]
    impl Summarize for StubSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
            Ok("summary".to_string())
        }
    }

    async fn make_agent(name: &str, responses: Vec<&str>) -> AgentLoop {
        let dir = tempfile::tempdir().unwrap();
        let prompts = PromptRegistry::new(dir.path());
        prompts.ensure_defaults().unwrap();
        prompts.load().await.unwrap();

        let mut registry = CapabilityRegistry::new(prompts);
        registry.register_tool(Arc::new(EchoTool)).unwrap();

        let store = Arc::new(Store::in_memory(2).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            Arc::new(Signer::new("test-key")),
            Arc::new(RateLimiter::new(60, 60)),
            store.clone(),
        ));
        let memory = WindowMemory::new(format!("{name}-session"), 8192, 1024, false, store, Arc::new(StubSummarizer));
        let provider = Arc::new(MockProvider::new(responses.into_iter().map(str::to_string).collect()));

        let config = crate::agent::AgentConfig {
            agent_name: name.to_string(),
            ..Default::default()
        };
        AgentLoop::new(provider, dispatcher, Arc::new(Signer::new("test-key")), None, config, memory)
    }

    #[tokio::test]
    async fn round_robin_relays_replies_between_agents() {
        let alice = make_agent("alice", vec!["Hello from Alice."]).await;
        let bob = make_agent("bob", vec!["Hello from Bob."]).await;

        let mut orchestrator = Orchestrator::new(
            vec![alice, bob],
            OrchestratorConfig { turns: 4, stagnation_threshold: 3, max_recoveries: 3 },
            None,
        );

        let transcript = orchestrator.run("Kick off the discussion.").await.unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0].agent_name, "alice");
        assert_eq!(transcript[1].agent_name, "bob");
    }

    #[tokio::test]
    async fn stagnation_triggers_recovery_and_resets_repeats() {
        let alice = make_agent("alice", vec!["same answer every time"]).await;

        let mut orchestrator = Orchestrator::new(
            vec![alice],
            OrchestratorConfig { turns: 10, stagnation_threshold: 3, max_recoveries: 3 },
            None,
        );

        let transcript = orchestrator.run("Start.").await.unwrap();
        // After 3 consecutive identical replies, recovery resets the input
        // to the redirect message, so later turns should not all be identical.
        assert!(transcript.len() >= 3);
    }

    #[tokio::test]
    async fn exhausting_max_recoveries_terminates_early() {
        let alice = make_agent("alice", vec!["identical"]).await;

        let mut orchestrator = Orchestrator::new(
            vec![alice],
            OrchestratorConfig { turns: 100, stagnation_threshold: 2, max_recoveries: 1 },
            None,
        );

        let transcript = orchestrator.run("Start.").await.unwrap();
        // With max_recoveries=1, the run should stop well short of 100 turns.
        assert!(transcript.len() < 100);
    }
}
