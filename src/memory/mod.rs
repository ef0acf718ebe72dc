//! Window Memory (C7) and Summariser Tool (C6): bounds a conversation to the
//! model's context budget, spilling overflow into a persisted running
//! summary (§4.6, §4.7).

pub mod summarizer;
pub mod window;

pub use summarizer::{INPUT_LIMIT_TOKENS, Summarize, SummarizeError, SummarizeTool, Summarizer};
pub use window::{MIN_MARGIN_TOKENS, WindowMemory};
