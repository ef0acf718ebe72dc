//! Minimal built-in tools demonstrating the dispatch contract (§8 scenarios 1 & 3),
//! plus the `shell` tool wiring the Security Policy (SPEC_FULL §B) into a real
//! execution path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::{SecurityPolicy, ValidationResult};

use super::traits::{Tool, ToolResult};

/// `echo(text: string) -> text`.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given text unchanged."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "VALIDATION_ERROR: missing required field `text`".to_string())?;
        Ok(ToolResult::ok(text))
    }
}

/// `sum(a: int, b: int) -> int`.
pub struct SumTool;

#[async_trait]
impl Tool for SumTool {
    fn name(&self) -> &str {
        "sum"
    }

    fn description(&self) -> &str {
        "Add two integers."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" }
            },
            "required": ["a", "b"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let a = args
            .get("a")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "VALIDATION_ERROR: missing required field `a`".to_string())?;
        let b = args
            .get("b")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "VALIDATION_ERROR: missing required field `b`".to_string())?;
        Ok(ToolResult::ok((a + b).to_string()))
    }
}

/// Executes shell commands via `sh -c`, subject to the active [`SecurityPolicy`].
///
/// A `ToolGroup::Runtime` member (`tools/profiles.rs`); callers restricted to
/// `ToolProfile::Minimal` or `ToolProfile::Messaging` never see this tool in
/// their catalog, regardless of the policy's own autonomy level.
pub struct ShellTool {
    policy: Arc<SecurityPolicy>,
}

impl ShellTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout/stderr output. \
         Only safe, non-destructive commands are permitted by the active security policy."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute."
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory for the command."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("VALIDATION_ERROR: missing required field `command`")?
            .to_string();

        let working_dir = args
            .get("working_dir")
            .and_then(Value::as_str)
            .map(str::to_string);

        let risk = self.policy.classify_command_risk(&command);
        let decision = self.policy.validate_command(&command);

        let decision_str = match &decision {
            ValidationResult::Allowed => "allowed",
            ValidationResult::NeedsApproval => "needs_approval",
            ValidationResult::Denied(_) => "denied",
        };
        self.policy
            .log_action(self.name(), args.clone(), risk, decision_str, None);

        match decision {
            ValidationResult::Allowed => {}
            ValidationResult::NeedsApproval => {
                return Err("command requires user approval before execution".into());
            }
            ValidationResult::Denied(reason) => {
                return Err(format!("command denied: {reason}"));
            }
        }

        // Run on a blocking thread so a long-running command doesn't stall the
        // async runtime.
        let result = tokio::task::spawn_blocking(move || {
            let mut cmd = std::process::Command::new("sh");
            cmd.arg("-c").arg(&command);
            if let Some(dir) = &working_dir {
                cmd.current_dir(dir);
            }
            cmd.output()
                .map_err(|e| format!("failed to spawn process: {e}"))
        })
        .await
        .map_err(|e| format!("blocking task panicked: {e}"))??;

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        let success = result.status.success();

        let output = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            format!("STDERR: {stderr}")
        } else {
            format!("{stdout}\nSTDERR: {stderr}")
        };

        let meta = json!({ "exit_code": result.status.code() });
        if success {
            Ok(ToolResult::ok(output).with_metadata(meta))
        } else {
            Ok(ToolResult::err(output).with_metadata(meta))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::AutonomyLevel;

    fn full_policy() -> Arc<SecurityPolicy> {
        Arc::new(SecurityPolicy::new(AutonomyLevel::Full, None, vec![], 3600, 100))
    }

    fn readonly_policy() -> Arc<SecurityPolicy> {
        Arc::new(SecurityPolicy::new(AutonomyLevel::ReadOnly, None, vec![], 3600, 100))
    }

    #[tokio::test]
    async fn shell_echo_succeeds() {
        let tool = ShellTool::new(full_policy());
        let r = tool.execute(json!({"command": "echo hello"})).await.unwrap();
        assert!(r.success);
        assert!(r.output.contains("hello"));
    }

    #[tokio::test]
    async fn shell_missing_command_arg_errors() {
        let tool = ShellTool::new(full_policy());
        let r = tool.execute(json!({})).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn shell_blocked_by_readonly_policy() {
        let tool = ShellTool::new(readonly_policy());
        let r = tool
            .execute(json!({"command": "mkdir /tmp/shell_tool_readonly_blocked_test"}))
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn shell_blocked_rm_always() {
        let tool = ShellTool::new(full_policy());
        let r = tool.execute(json!({"command": "rm -rf /"})).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn echo_returns_input_text() {
        let result = EchoTool.execute(json!({"text": "hi"})).await.unwrap();
        assert_eq!(result.output, "hi");
        assert!(result.success);
    }

    #[tokio::test]
    async fn sum_adds_two_integers() {
        let result = SumTool.execute(json!({"a": 1, "b": 2, "c": 99})).await.unwrap();
        assert_eq!(result.output, "3");
    }

    #[tokio::test]
    async fn sum_rejects_missing_operand() {
        let err = SumTool.execute(json!({"a": 1})).await.unwrap_err();
        assert!(err.starts_with("VALIDATION_ERROR"));
    }
}
