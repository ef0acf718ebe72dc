//! Dual-format tool-call parser for LLM responses.
//!
//! Supports two formats that the LLM may use to express a tool call:
//!
//! # Format 1 — OpenAI JSON
//! The response content is a JSON object containing a `tool_calls` array:
//!
//! ```json
//! {
//!   "tool_calls": [
//!     { "id": "call_abc", "type": "function",
//!       "function": { "name": "read_file", "arguments": "{\"path\": \"/tmp/x\"}" } }
//!   ]
//! }
//! ```
//!
//! # Format 2 — XML inline
//! The response is free-form text containing one or more `<tool_call>` tags:
//!
//! ```xml
//! I'll read the file now.
//! <tool_call>{"name": "read_file", "arguments": {"path": "/tmp/x"}}</tool_call>
//! ```

use serde_json::Value;

// ─── ParsedToolCall ───────────────────────────────────────────────────────────

/// A tool invocation extracted from an LLM response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    /// Tool name as registered in the `ToolRegistry`.
    pub name: String,
    /// Arguments to pass to the tool.
    pub arguments: Value,
    /// Optional call ID (present in OpenAI JSON format).
    pub call_id: Option<String>,
}

// ─── Public API ───────────────────────────────────────────────────────────────

/// Parse all tool calls from an LLM response string.
///
/// Tries the JSON format first; if the content is not a valid JSON object with
/// `tool_calls`, falls back to scanning for XML `<tool_call>` tags.
///
/// Returns an empty `Vec` when no tool calls are found.
pub fn parse_tool_calls(content: &str) -> Vec<ParsedToolCall> {
    // Prefer the JSON format (explicit contract).
    if let Some(calls) = try_parse_json(content) {
        if !calls.is_empty() {
            return calls;
        }
    }
    // Fall back to XML scanning.
    parse_xml(content)
}

// ─── JSON parser ──────────────────────────────────────────────────────────────

fn try_parse_json(content: &str) -> Option<Vec<ParsedToolCall>> {
    let trimmed = content.trim();
    // The entire content must be a valid JSON object.
    let obj: Value = serde_json::from_str(trimmed).ok()?;
    let raw_calls = obj.get("tool_calls")?;
    // A single tool call may arrive as a bare object instead of a one-element
    // list; normalize both shapes to a slice.
    let single;
    let tool_calls: &[Value] = match raw_calls {
        Value::Array(entries) => entries,
        Value::Object(_) => {
            single = [raw_calls.clone()];
            &single
        }
        _ => return None,
    };

    let mut result = Vec::new();
    for entry in tool_calls {
        // OpenAI format: { "id": "...", "type": "function", "function": { "name": "...", "arguments": "..." } }
        let func = entry.get("function")?;
        let name = func.get("name")?.as_str()?.to_string();
        let call_id = entry.get("id").and_then(|v| v.as_str()).map(str::to_string);

        // `arguments` may be a JSON string (OpenAI) or an object (some providers).
        let arguments = match func.get("arguments") {
            Some(Value::String(s)) => {
                serde_json::from_str(s).unwrap_or(Value::Object(Default::default()))
            }
            Some(v) => v.clone(),
            None => Value::Object(Default::default()),
        };

        result.push(ParsedToolCall { name, arguments, call_id });
    }
    Some(result)
}

// ─── XML parser ───────────────────────────────────────────────────────────────

fn parse_xml(content: &str) -> Vec<ParsedToolCall> {
    const OPEN: &str = "<tool_call>";
    const CLOSE: &str = "</tool_call>";

    let mut result = Vec::new();
    let mut remaining = content;

    while let Some(start) = remaining.find(OPEN) {
        remaining = &remaining[start + OPEN.len()..];
        let end = match remaining.find(CLOSE) {
            Some(i) => i,
            None => break,
        };
        let body = remaining[..end].trim();
        remaining = &remaining[end + CLOSE.len()..];

        if let Some(call) = parse_xml_body(body) {
            result.push(call);
        }
    }
    result
}

/// Parse the JSON body of a single `<tool_call>` tag.
///
/// Expected shape:
/// ```json
/// {"name": "tool_name", "arguments": { … }}
/// ```
fn parse_xml_body(body: &str) -> Option<ParsedToolCall> {
    let obj: Value = serde_json::from_str(body).ok()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let arguments = obj
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));
    Some(ParsedToolCall { name, arguments, call_id: None })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
