//! `list_memory` tool: structured listing of saved entries, optionally
//! scoped to one category (§4.2).

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::memory::{Category, MemoryStore};
use std::sync::Arc;

pub struct MemoryListTool {
    memory: Arc<MemoryStore>,
}

impl MemoryListTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl ToolHandler for MemoryListTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_memory".into(),
            description: "List every saved memory entry, optionally filtered to one category.".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string", "description": "Optional: context, preference, project, credential, learned, or note"}
                }
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let category = match args.get("category").and_then(|v| v.as_str()) {
            Some(raw) => match Category::parse(raw) {
                Some(c) => Some(c),
                None => return ToolContent::Error(format!("unknown category {raw:?}")),
            },
            None => None,
        };

        match self.memory.list_all(category).await {
            Ok(entries) if entries.is_empty() => ToolContent::Text("No memory entries saved.".into()),
            Ok(entries) => {
                let body = entries
                    .iter()
                    .map(|e| format!("- [{}] **{}**: {}", e.category, e.key, e.value))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolContent::Text(body)
            }
            Err(err) => ToolContent::Error(format!("failed to list memory: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

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
    async fn lists_saved_entries_across_categories() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        memory.save(Category::Context, "timezone", "UTC").await.unwrap();
        memory.save(Category::Preference, "editor", "neovim").await.unwrap();
        let tool = MemoryListTool::new(memory);
        let result = tool.call(serde_json::json!({}), &ctx()).await;
        match result {
            ToolContent::Text(t) => {
                assert!(t.contains("timezone"));
                assert!(t.contains("editor"));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scopes_to_requested_category() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        memory.save(Category::Context, "timezone", "UTC").await.unwrap();
        memory.save(Category::Preference, "editor", "neovim").await.unwrap();
        let tool = MemoryListTool::new(memory);
        let result = tool.call(serde_json::json!({"category": "context"}), &ctx()).await;
        match result {
            ToolContent::Text(t) => {
                assert!(t.contains("timezone"));
                assert!(!t.contains("editor"));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }
}
