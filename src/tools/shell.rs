//! `run_quick_command` tool: runs a shell command through the Safety Gate
//! before ever spawning a process (§4.4 — "Any tool that shells out MUST
//! call `is_destructive` before executing... MUST return a typed error
//! without side effects when the check fires").

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::safety::SafetyGate;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub struct ShellTool {
    safety: Arc<SafetyGate>,
}

impl ShellTool {
    pub fn new(safety: Arc<SafetyGate>) -> Self {
        Self { safety }
    }
}

#[async_trait::async_trait]
impl ToolHandler for ShellTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "run_quick_command".into(),
            description: "Run a short shell command and return its combined stdout/stderr. \
                Destructive commands (rm -rf, git reset --hard, DROP TABLE, disk formatting, \
                piping curl to a shell, fork bombs, etc.) are refused before anything runs."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The shell command to run"},
                    "timeout_secs": {"type": "integer", "description": "Override the default 60s timeout"}
                },
                "required": ["command"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: command".into());
        };

        if let Err(err) = self.safety.is_destructive(command) {
            return ToolContent::Error(format!("destructive command refused: {err}"));
        }

        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let run = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match tokio::time::timeout(Duration::from_secs(timeout_secs), run).await {
            Ok(Ok(output)) => {
                let mut text = String::new();
                text.push_str(&String::from_utf8_lossy(&output.stdout));
                if !output.stderr.is_empty() {
                    text.push_str("\n[stderr]\n");
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                if !output.status.success() {
                    text.push_str(&format!("\n[exit status: {}]", output.status));
                }
                ToolContent::Text(text)
            }
            Ok(Err(err)) => ToolContent::Error(format!("failed to spawn command: {err}")),
            Err(_) => ToolContent::Error(format!("command timed out after {timeout_secs}s")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SafetyConfig;

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: crate::AgentId::from("tester"),
            channel_id: crate::ChannelId::from("test"),
            task_id: None,
            conversation_id: "test:1".into(),
            reply_tx: None,
            replied_flag: None,
        }
    }

    #[tokio::test]
    async fn refuses_destructive_command_without_spawning() {
        let tool = ShellTool::new(Arc::new(SafetyGate::new(SafetyConfig::default())));
        let result = tool.call(serde_json::json!({"command": "rm -rf /"}), &ctx()).await;
        assert!(result.is_error());
        assert!(result.as_text_preview().to_lowercase().contains("destructive"));
    }

    #[tokio::test]
    async fn runs_benign_command() {
        let tool = ShellTool::new(Arc::new(SafetyGate::new(SafetyConfig::default())));
        let result = tool.call(serde_json::json!({"command": "echo hello"}), &ctx()).await;
        assert!(matches!(result, ToolContent::Text(t) if t.contains("hello")));
    }
}
