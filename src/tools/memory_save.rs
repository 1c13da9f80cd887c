//! `save_memory` tool: upserts a key/value entry into one of the Memory
//! Store's flat-file categories (§4.2).

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::memory::{Category, MemoryStore};
use std::sync::Arc;

pub struct MemorySaveTool {
    memory: Arc<MemoryStore>,
}

impl MemorySaveTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl ToolHandler for MemorySaveTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "save_memory".into(),
            description: "Save or update a piece of information under a category and key: \
                context, preference, project, credential, learned, or note."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string", "enum": ["context", "preference", "project", "credential", "learned", "note"]},
                    "key": {"type": "string"},
                    "value": {"type": "string"}
                },
                "required": ["category", "key", "value"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let Some(category) = args.get("category").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: category".into());
        };
        let Some(category) = Category::parse(category) else {
            return ToolContent::Error(format!(
                "unknown category {category:?}; expected one of: context, preference, project, credential, learned, note"
            ));
        };
        let Some(key) = args.get("key").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: key".into());
        };
        let value = args.get("value").and_then(|v| v.as_str()).unwrap_or_default();

        match self.memory.save(category, key, value).await {
            Ok(()) => ToolContent::Text(format!("Saved [{category}] {key}.")),
            Err(err) => ToolContent::Error(format!("failed to save memory: {err}")),
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
    async fn saves_under_requested_category() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        let tool = MemorySaveTool::new(memory.clone());
        let result = tool
            .call(serde_json::json!({"category": "preference", "key": "theme", "value": "dark"}), &ctx())
            .await;
        assert!(!result.is_error());
        let entries = memory.list_all(Some(Category::Preference)).await.unwrap();
        assert!(entries.iter().any(|e| e.key == "theme" && e.value == "dark"));
    }

    #[tokio::test]
    async fn unknown_category_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        let tool = MemorySaveTool::new(memory);
        let result = tool
            .call(serde_json::json!({"category": "nonsense", "key": "x", "value": "y"}), &ctx())
            .await;
        assert!(result.is_error());
    }
}
