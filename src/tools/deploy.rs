//! `deploy_<agent>` tools: the Brain's handle onto each specialist Agent
//! Loop (§4.5, §4.9, §4.10). A `DeployTool` does not run an Agent Loop
//! itself — that would make this module depend on `crate::agent`, which
//! depends back on the tool registry to build each specialist's tool list.
//! Instead it holds a [`SpecialistRunner`]: the Brain constructs one
//! `DeployTool` per specialist at startup, each closing over an
//! `agent::loop_::AgentLoop` bound to that specialist's system prompt and
//! tool subset, and registers it under `deploy_<agent_name>`.

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use std::sync::Arc;

/// Runs one specialist Agent Loop to completion and returns its terminal
/// `done`/`stuck` summary as the tool result for whoever deployed it.
#[async_trait::async_trait]
pub trait SpecialistRunner: Send + Sync {
    async fn run(&self, task: String, context: Option<String>, ctx: &ToolContext) -> ToolContent;
}

pub struct DeployTool {
    agent_name: String,
    description: String,
    runner: Arc<dyn SpecialistRunner>,
}

impl DeployTool {
    pub fn new(agent_name: impl Into<String>, description: impl Into<String>, runner: Arc<dyn SpecialistRunner>) -> Self {
        Self {
            agent_name: agent_name.into(),
            description: description.into(),
            runner,
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for DeployTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: format!("deploy_{}", self.agent_name),
            description: self.description.clone(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string", "description": "What the specialist should accomplish"},
                    "context": {"type": "string", "description": "Optional background the specialist needs"}
                },
                "required": ["task"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> ToolContent {
        let Some(task) = args.get("task").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: task".into());
        };
        let context = args.get("context").and_then(|v| v.as_str()).map(str::to_string);
        self.runner.run(task.to_string(), context, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRunner;

    #[async_trait::async_trait]
    impl SpecialistRunner for EchoRunner {
        async fn run(&self, task: String, context: Option<String>, _ctx: &ToolContext) -> ToolContent {
            ToolContent::Text(format!("ran: {task} (context: {context:?})"))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: crate::AgentId::from("brain"),
            channel_id: crate::ChannelId::from("test"),
            task_id: None,
            conversation_id: "test:1".into(),
            reply_tx: None,
            replied_flag: None,
        }
    }

    #[tokio::test]
    async fn deploy_tool_name_is_namespaced_by_agent() {
        let tool = DeployTool::new("research", "deploys the research specialist", Arc::new(EchoRunner));
        assert_eq!(tool.spec().name, "deploy_research");
    }

    #[tokio::test]
    async fn deploy_tool_forwards_task_and_context_to_runner() {
        let tool = DeployTool::new("research", "deploys the research specialist", Arc::new(EchoRunner));
        let result = tool
            .call(serde_json::json!({"task": "find flights", "context": "leaving Friday"}), &ctx())
            .await;
        match result {
            ToolContent::Text(t) => {
                assert!(t.contains("find flights"));
                assert!(t.contains("leaving Friday"));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_task_is_a_typed_error() {
        let tool = DeployTool::new("research", "deploys the research specialist", Arc::new(EchoRunner));
        let result = tool.call(serde_json::json!({}), &ctx()).await;
        assert!(result.is_error());
    }
}
