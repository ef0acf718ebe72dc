//! Stable error taxonomy surfaced in MCP error envelopes (§7).

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// One of the stable `code` values from §7's error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ToolNotFound,
    ValidationError,
    ToolExecutionError,
    SqlError,
    SignatureError,
    RateLimitExceeded,
    InputTooLarge,
    PromptNotFound,
    ConfigFatal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            ErrorCode::SqlError => "SQL_ERROR",
            ErrorCode::SignatureError => "SIGNATURE_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InputTooLarge => "INPUT_TOO_LARGE",
            ErrorCode::PromptNotFound => "PROMPT_NOT_FOUND",
            ErrorCode::ConfigFatal => "CONFIG_FATAL",
        }
    }
}

/// Wire shape for a failed `tools/call` (§6 "Tool-call response body (failure)").
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub tool: String,
    pub timestamp: String,
    pub request: Value,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, detail: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        let tool = tool.into();
        Self {
            error: format!("{}: {}", code.as_str(), detail.into()),
            timestamp: Utc::now().to_rfc3339(),
            request: serde_json::json!({ "name": tool, "arguments": arguments }),
            tool,
        }
    }
}
