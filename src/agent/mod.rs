//! Agent Intelligence Layer — the bounded reason/act loop (§4.8).
//!
//! # Key types
//! - [`AgentLoop`] — drives the tool-call iteration cycle against a [`Dispatcher`](crate::dispatcher::Dispatcher)
//! - [`AgentConfig`] — parameters for the loop (model, max iterations, etc.)
//! - [`AgentMessage`] — a message in the agent's conversation history
//! - [`ParsedToolCall`] — a tool invocation extracted from an LLM response

pub mod loop_;
pub mod tool_parser;

pub use loop_::{AgentConfig, AgentLoop, AgentMessage};
pub use tool_parser::ParsedToolCall;
