//! `AgentLoop` — the bounded reason/act cycle run against one backend model
//! (§4.8).
//!
//! # Algorithm
//!
//! ```text
//! INIT → STREAMING ──tool_call──► DISPATCHING ──result──► STREAMING
//!               │                         │
//!               └─final_chunk─► DONE      └─iteration_cap─► CAPPED → DONE
//! ```
//!
//! Each turn discovers the capability catalog (cached 5 minutes), renders the
//! `system` prompt through the Dispatcher's own `prompts/get` verb, prunes
//! and assembles the conversation, then streams completions from the
//! backend model until a final answer or the iteration cap is hit.

use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering as AtomicOrdering},
};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::Mutex as AsyncMutex;

use crate::ai::context::ContextManager;
use crate::ai::provider::LLMProvider;
use crate::ai::types::{CompletionRequest, Message as LlmMessage, MessageRole};
use crate::dispatcher::Dispatcher;
use crate::event_bus::{AppEvent, EventBus};
use crate::memory::WindowMemory;
use crate::persistence::{Message as StoredMessage, Role};
use crate::signer::Signer;
use crate::tools::ToolProfile;

use super::tool_parser::{ParsedToolCall, parse_tool_calls};

/// How long a fetched capability catalog stays valid before being re-fetched
/// (§4.8 step 1: "5-minute cache; invalidate on error").
const CAPABILITY_CACHE_TTL: Duration = Duration::from_secs(300);

// ─── AgentConfig ──────────────────────────────────────────────────────────

/// Runtime parameters for one `AgentLoop`, derived from
/// [`crate::config::schema::AgentConfig`] and [`crate::config::schema::ModelConfig`]
/// plus a couple of loop-local identity fields.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Hard cap on tool-call iterations per turn (spec default 15).
    pub max_iterations: usize,
    pub agent_name: String,
    pub role_definition: String,
    /// Restricts the tool catalog this agent sees to a [`ToolProfile`] (§B
    /// "tool profiles"). `None` (the default) serves the full catalog,
    /// matching spec-mandated behavior.
    pub tool_profile: Option<ToolProfile>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            max_iterations: 15,
            agent_name: "agent".to_string(),
            role_definition: "a helpful assistant".to_string(),
            tool_profile: None,
        }
    }
}

// ─── AgentMessage ─────────────────────────────────────────────────────────

/// A message in the agent's conversation history, as persisted by
/// [`WindowMemory`].
#[derive(Debug, Clone)]
pub enum AgentMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    ToolResults { content: String },
}

impl From<&StoredMessage> for AgentMessage {
    fn from(message: &StoredMessage) -> Self {
        let content = message.content.clone();
        match message.role {
            Role::System => AgentMessage::System { content },
            Role::User => AgentMessage::User { content },
            Role::Assistant => AgentMessage::Assistant { content },
            Role::Tool => AgentMessage::ToolResults { content },
        }
    }
}

/// `ai::types::MessageRole` has no `Tool` variant; tool-result turns are
/// surfaced to the backend model as `User` messages, matching how every
/// other provider-facing role conversion in this codebase already treats
/// non-native roles.
fn to_llm_role(role: &Role) -> MessageRole {
    match role {
        Role::System => MessageRole::System,
        Role::User | Role::Tool => MessageRole::User,
        Role::Assistant => MessageRole::Assistant,
    }
}

fn stored_to_llm(message: &StoredMessage) -> LlmMessage {
    LlmMessage {
        role: to_llm_role(&message.role),
        content: message.content.clone(),
    }
}

// ─── AgentLoop ────────────────────────────────────────────────────────────

struct CapabilitySections {
    tools: String,
    prompts: String,
    resources: String,
}

/// Drives one agent's reason/act cycle. Owns exactly one [`WindowMemory`]
/// instance, never shared across agents (§5).
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    dispatcher: Arc<Dispatcher>,
    signer: Arc<Signer>,
    bus: Option<Arc<dyn EventBus>>,
    config: AgentConfig,
    memory: WindowMemory,
    bound_context: HashMap<String, String>,
    cancel_flag: Option<Arc<AtomicBool>>,
    capability_cache: AsyncMutex<Option<(Instant, CapabilitySections)>>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        dispatcher: Arc<Dispatcher>,
        signer: Arc<Signer>,
        bus: Option<Arc<dyn EventBus>>,
        config: AgentConfig,
        memory: WindowMemory,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            signer,
            bus,
            config,
            memory,
            bound_context: HashMap::new(),
            cancel_flag: None,
            capability_cache: AsyncMutex::new(None),
        }
    }

    /// Attach a cancellation flag; the loop aborts at the next streaming
    /// suspension point once it observes `true`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Bind a placeholder name (e.g. `retrieved_session_id`) to a concrete
    /// value resolved from an earlier turn, consulted by the Dispatcher's
    /// placeholder substitution (§4.5) on every subsequent tool call.
    pub fn bind_context(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bound_context.insert(name.into(), value.into());
    }

    pub fn memory(&self) -> &WindowMemory {
        &self.memory
    }

    /// Mutable access to this agent's Window Memory, used by the
    /// orchestrator's stagnation-recovery procedure (§4.9).
    pub fn memory_mut(&mut self) -> &mut WindowMemory {
        &mut self.memory
    }

    pub fn agent_name(&self) -> &str {
        &self.config.agent_name
    }

    fn session_id(&self) -> String {
        self.memory.session_id().to_string()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(AtomicOrdering::SeqCst))
    }

    // ── Capability discovery ────────────────────────────────────────────

    /// Fetch (or serve from cache) the tool/prompt/resource catalog used to
    /// render the `system` prompt (§4.8 step 1).
    async fn capability_sections(&self) -> (String, String, String) {
        let mut cache = self.capability_cache.lock().await;
        if let Some((fetched_at, sections)) = cache.as_ref() {
            if fetched_at.elapsed() < CAPABILITY_CACHE_TTL {
                return (sections.tools.clone(), sections.prompts.clone(), sections.resources.clone());
            }
        }

        let tools = self.dispatcher.list_tools(self.config.tool_profile);
        let tools_section = if tools.is_empty() {
            "*No tools available.*".to_string()
        } else {
            tools
                .iter()
                .map(|t| format!("- `{}`: {}", t.name, t.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompts = self.dispatcher.list_prompts().await;
        let prompts_section = if prompts.is_empty() {
            "*No prompt templates available.*".to_string()
        } else {
            prompts
                .iter()
                .map(|p| format!("- `{}`: {}", p.name, p.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let resources = self.dispatcher.list_resources();
        let resources_section = if resources.is_empty() {
            "*No resources available.*".to_string()
        } else {
            resources
                .iter()
                .map(|r| format!("- `{}`: {}", r.uri_pattern, r.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let sections = CapabilitySections {
            tools: tools_section,
            prompts: prompts_section,
            resources: resources_section,
        };
        let snapshot = (sections.tools.clone(), sections.prompts.clone(), sections.resources.clone());
        *cache = Some((Instant::now(), sections));
        snapshot
    }

    /// Render the `system` prompt template with the current agent identity,
    /// capability catalog, and Window Memory summary (§4.8 step 2).
    async fn render_system_prompt(&self) -> String {
        let (tools_section, prompts_section, resources_section) = self.capability_sections().await;

        let mut vars = HashMap::new();
        vars.insert("agent_name".to_string(), self.config.agent_name.clone());
        vars.insert("current_date".to_string(), chrono::Utc::now().to_rfc3339());
        vars.insert("tools_section".to_string(), tools_section);
        vars.insert("prompts_section".to_string(), prompts_section);
        vars.insert("resources_section".to_string(), resources_section);
        vars.insert("role_definition".to_string(), self.config.role_definition.clone());
        vars.insert("memory_summary".to_string(), self.memory.latest_context());

        match self.dispatcher.get_prompt("system", vars).await {
            Ok(rendered) => rendered,
            Err(err) => format!(
                "You are {}, {}. (system prompt template unavailable: {})",
                self.config.agent_name, self.config.role_definition, err.error
            ),
        }
    }

    // ── Turn entry point ────────────────────────────────────────────────

    /// Run one user turn to completion, streaming content chunks to
    /// `stream_callback` as they arrive.
    #[tracing::instrument(name = "agent.run", skip_all, fields(model = %self.config.model, session = %self.session_id()))]
    pub async fn run(
        &mut self,
        user_message: &str,
        stream_callback: Option<&(dyn Fn(&str) + Send + Sync)>,
    ) -> Result<String, String> {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::AgentStarted { session_id: self.session_id() });
        }

        let system_prompt = self.render_system_prompt().await;

        self.memory.role_message(Role::User, user_message);
        self.memory.prune().await;

        let ctx_limit = self.provider.context_limit();
        let ctx = ContextManager::new(ctx_limit);

        let mut iteration = 0usize;
        let mut last_content = String::new();

        loop {
            if self.is_cancelled() {
                return Err("cancelled".to_string());
            }

            // Step 4-5: assemble [system] + prior + [user], evict oldest
            // non-system messages if the turn would exceed the budget.
            let mut exec_conversation: Vec<LlmMessage> = Vec::with_capacity(self.memory.messages().len() + 1);
            exec_conversation.push(LlmMessage::system(system_prompt.clone()));
            exec_conversation.extend(self.memory.messages().iter().map(stored_to_llm));
            exec_conversation = ctx.truncate_to_fit(exec_conversation, self.config.max_tokens.unwrap_or(512) as usize);

            if iteration >= self.config.max_iterations {
                let capped = format!(
                    "{last_content}\n\n[Agent loop reached the maximum of {} iterations without a final answer.]",
                    self.config.max_iterations
                );
                self.memory.role_message(Role::Assistant, capped.clone());
                if let Some(bus) = &self.bus {
                    let _ = bus.publish(AppEvent::AgentComplete {
                        session_id: self.session_id(),
                        message: capped.clone(),
                    });
                }
                return Ok(capped);
            }

            let mut request = CompletionRequest::new(self.config.model.clone(), exec_conversation);
            if let Some(t) = self.config.temperature {
                request = request.with_temperature(t);
            }
            if let Some(m) = self.config.max_tokens {
                request = request.with_max_tokens(m);
            }
            request = request.with_stream(true);

            let mut stream = self.provider.stream(request).await?;
            let mut content = String::new();
            while let Some(chunk) = stream.next().await {
                if self.is_cancelled() {
                    return Err("cancelled".to_string());
                }
                let chunk = chunk?;
                content.push_str(&chunk.delta);
                if let Some(cb) = stream_callback {
                    cb(&chunk.delta);
                }
                if chunk.is_final {
                    break;
                }
            }
            last_content = content.clone();

            let tool_calls = parse_tool_calls(&content);
            if tool_calls.is_empty() {
                self.memory.role_message(Role::Assistant, content.clone());
                if let Some(bus) = &self.bus {
                    let _ = bus.publish(AppEvent::AgentComplete {
                        session_id: self.session_id(),
                        message: content.clone(),
                    });
                }
                return Ok(content);
            }

            self.memory.role_message(Role::Assistant, content);

            let results_message = self.dispatch_tool_calls(&tool_calls).await;
            self.memory.role_message(Role::Tool, results_message);

            iteration += 1;
        }
    }

    // ── Tool dispatch ────────────────────────────────────────────────────

    /// Execute every parsed tool call against the Dispatcher in emission
    /// order, formatting results into a single `<tool_output>`-wrapped
    /// message (§4.8 step 6c).
    async fn dispatch_tool_calls(&self, calls: &[ParsedToolCall]) -> String {
        let session_id = self.session_id();
        let mut rendered = String::from("----BEGIN TOOL RESULTS----\n");

        for (index, call) in calls.iter().enumerate() {
            if let Some(bus) = &self.bus {
                let _ = bus.publish(AppEvent::AgentToolStart {
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                });
            }

            let outcome = match self
                .dispatcher
                .call_tool(&session_id, &call.name, call.arguments.clone(), &self.bound_context)
                .await
            {
                Ok(envelope) => match self.signer.verify(&envelope, now_unix()) {
                    Ok(body) => {
                        let output = body.get("output").and_then(|v| v.as_str()).unwrap_or("").to_string();
                        (output, true)
                    }
                    Err(e) => (format!("SIGNATURE_ERROR: {e}"), false),
                },
                Err(err) => (err.error.clone(), false),
            };

            if let Some(bus) = &self.bus {
                let _ = bus.publish(AppEvent::AgentToolResult {
                    tool_name: call.name.clone(),
                    result: outcome.0.clone(),
                    success: outcome.1,
                });
            }

            rendered.push_str(&format!(
                "<tool_output index=\"{index}\" name=\"{}\">{}</tool_output>\n",
                call.name, outcome.0
            ));
        }

        rendered.push_str("----END TOOL RESULTS----");
        rendered
    }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
