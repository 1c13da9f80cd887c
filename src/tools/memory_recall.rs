//! `recall_memory` tool: keyword (and, if configured, semantic) search
//! across every memory category (§4.2).

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::memory::MemoryStore;
use std::sync::Arc;

pub struct MemoryRecallTool {
    memory: Arc<MemoryStore>,
}

impl MemoryRecallTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl ToolHandler for MemoryRecallTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "recall_memory".into(),
            description: "Search saved context, preferences, projects, credentials, and \
                learned facts for lines matching a query."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: query".into());
        };
        match self.memory.recall(query).await {
            Ok(summary) if summary.trim().is_empty() => {
                ToolContent::Text(format!("No memories matched \"{query}\"."))
            }
            Ok(summary) => ToolContent::Text(summary),
            Err(err) => ToolContent::Error(format!("recall failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::memory::Category;

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
    async fn recalls_previously_saved_entry() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        memory.save(Category::Context, "favorite_editor", "neovim").await.unwrap();
        let tool = MemoryRecallTool::new(memory);
        let result = tool.call(serde_json::json!({"query": "editor"}), &ctx()).await;
        match result {
            ToolContent::Text(t) => assert!(t.contains("neovim")),
            other => panic!("expected text result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_match_reports_empty_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        let tool = MemoryRecallTool::new(memory);
        let result = tool.call(serde_json::json!({"query": "nothing-ever-saved"}), &ctx()).await;
        assert!(!result.is_error());
    }
}
