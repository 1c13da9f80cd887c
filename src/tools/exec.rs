//! `run_process` tool: runs a program directly (no shell interpolation),
//! for specialists (Coder, System) that need argv-level control. Still
//! safety-gated: the reconstructed command line is checked the same way
//! [`super::shell::ShellTool`] checks its raw string, since a destructive
//! verb doesn't stop being destructive for arriving as argv instead of text.

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::safety::SafetyGate;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub struct ExecTool {
    safety: Arc<SafetyGate>,
}

impl ExecTool {
    pub fn new(safety: Arc<SafetyGate>) -> Self {
        Self { safety }
    }
}

#[async_trait::async_trait]
impl ToolHandler for ExecTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "run_process".into(),
            description: "Run a program with explicit arguments (no shell parsing). \
                Use this instead of run_quick_command when arguments contain characters \
                that a shell would otherwise interpret."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "program": {"type": "string"},
                    "args": {"type": "array", "items": {"type": "string"}},
                    "working_dir": {"type": "string"},
                    "timeout_secs": {"type": "integer"}
                },
                "required": ["program"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let Some(program) = args.get("program").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: program".into());
        };
        let argv: Vec<String> = args
            .get("args")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let reconstructed = format!("{program} {}", argv.join(" "));
        if let Err(err) = self.safety.is_destructive(&reconstructed) {
            return ToolContent::Error(format!("destructive command refused: {err}"));
        }

        let mut cmd = Command::new(program);
        cmd.args(&argv);
        if let Some(dir) = args.get("working_dir").and_then(|v| v.as_str()) {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let timeout_secs = args.get("timeout_secs").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_TIMEOUT_SECS);
        match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                if !output.stderr.is_empty() {
                    text.push_str("\n[stderr]\n");
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                if !output.status.success() {
                    text.push_str(&format!("\n[exit status: {}]", output.status));
                }
                ToolContent::Text(text)
            }
            Ok(Err(err)) => ToolContent::Error(format!("failed to spawn {program}: {err}")),
            Err(_) => ToolContent::Error(format!("process timed out after {timeout_secs}s")),
        }
    }
}
