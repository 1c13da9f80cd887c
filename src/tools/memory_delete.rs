//! `delete_memory` tool: removes a single key, wipes a whole category, or
//! (via the `category == "all"` sentinel) wipes everything (§4.2).

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::memory::{Category, DeleteOutcome, MemoryStore};
use std::sync::Arc;

pub struct MemoryDeleteTool {
    memory: Arc<MemoryStore>,
}

impl MemoryDeleteTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

fn describe(outcome: DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::WipedAll { entries_removed } => {
            format!("Wiped all memory ({entries_removed} entries removed).")
        }
        DeleteOutcome::RemovedKey { category, key } => format!("Removed [{category}] {key}."),
        DeleteOutcome::NothingMatched => "No matching entry found; nothing removed.".into(),
        DeleteOutcome::UnknownCategory { valid } => format!(
            "Unknown category; expected one of: {}",
            valid.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
        ),
    }
}

#[async_trait::async_trait]
impl ToolHandler for MemoryDeleteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delete_memory".into(),
            description: "Delete one memory key, wipe an entire category, or (category = \"all\") \
                wipe everything saved in memory."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string", "description": "context, preference, project, credential, learned, note, or \"all\""},
                    "key": {"type": "string", "description": "Omit to wipe the whole category"}
                },
                "required": ["category"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let Some(category_arg) = args.get("category").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: category".into());
        };
        let key = args.get("key").and_then(|v| v.as_str());

        if category_arg.eq_ignore_ascii_case("all") {
            return match self.memory.delete_all().await {
                Ok(outcome) => ToolContent::Text(describe(outcome)),
                Err(err) => ToolContent::Error(format!("failed to wipe memory: {err}")),
            };
        }

        let Some(category) = Category::parse(category_arg) else {
            return ToolContent::Text(describe(DeleteOutcome::UnknownCategory { valid: Category::all().to_vec() }));
        };

        match self.memory.delete(category, key).await {
            Ok(outcome) => ToolContent::Text(describe(outcome)),
            Err(err) => ToolContent::Error(format!("failed to delete memory: {err}")),
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
    async fn removes_a_single_key() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        memory.save(Category::Learned, "quirk", "prefers tabs").await.unwrap();
        let tool = MemoryDeleteTool::new(memory.clone());
        let result = tool.call(serde_json::json!({"category": "learned", "key": "quirk"}), &ctx()).await;
        assert!(!result.is_error());
        let entries = memory.list_all(Some(Category::Learned)).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn all_sentinel_wipes_every_category() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        memory.save(Category::Context, "k", "v").await.unwrap();
        let tool = MemoryDeleteTool::new(memory.clone());
        let result = tool.call(serde_json::json!({"category": "all"}), &ctx()).await;
        assert!(!result.is_error());
        let entries = memory.list_all(None).await.unwrap();
        assert!(entries.is_empty());
    }
}
