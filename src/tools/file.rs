//! File tools (read/write/list), gated by [`SafetyGate::is_path_allowed`]
//! rather than a hand-rolled path blocklist — the allow-list is the one
//! source of truth for which paths tools may touch (§4.4).

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::safety::SafetyGate;
use std::path::Path;
use std::sync::Arc;

pub struct FileReadTool {
    safety: Arc<SafetyGate>,
}

pub struct FileWriteTool {
    safety: Arc<SafetyGate>,
}

pub struct FileListTool {
    safety: Arc<SafetyGate>,
}

impl FileReadTool {
    pub fn new(safety: Arc<SafetyGate>) -> Self {
        Self { safety }
    }
}
impl FileWriteTool {
    pub fn new(safety: Arc<SafetyGate>) -> Self {
        Self { safety }
    }
}
impl FileListTool {
    pub fn new(safety: Arc<SafetyGate>) -> Self {
        Self { safety }
    }
}

fn require_path(args: &serde_json::Value) -> Result<&str, ToolContent> {
    args.get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolContent::Error("missing required field: path".into()))
}

#[async_trait::async_trait]
impl ToolHandler for FileReadTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_file".into(),
            description: "Read a text file's contents.".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let path = match require_path(&args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(err) = self.safety.is_path_allowed(Path::new(path)) {
            return ToolContent::Error(err.to_string());
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) => ToolContent::Text(content),
            Err(err) => ToolContent::Error(format!("failed to read {path}: {err}")),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for FileWriteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_file".into(),
            description: "Write (overwrite) a text file, creating parent directories as needed.".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
                "required": ["path", "content"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let path = match require_path(&args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        if let Err(err) = self.safety.is_path_allowed(Path::new(path)) {
            return ToolContent::Error(err.to_string());
        }
        let path_ref = Path::new(path);
        if let Some(parent) = path_ref.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return ToolContent::Error(format!("failed to create directory {}: {err}", parent.display()));
            }
        }
        match tokio::fs::write(path_ref, content).await {
            Ok(()) => ToolContent::Text(format!("wrote {} bytes to {path}", content.len())),
            Err(err) => ToolContent::Error(format!("failed to write {path}: {err}")),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for FileListTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_files".into(),
            description: "List entries (name, type, size) in a directory.".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let path = match require_path(&args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(err) = self.safety.is_path_allowed(Path::new(path)) {
            return ToolContent::Error(err.to_string());
        }
        let mut reader = match tokio::fs::read_dir(path).await {
            Ok(r) => r,
            Err(err) => return ToolContent::Error(format!("failed to read directory {path}: {err}")),
        };
        let mut lines = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let meta = entry.metadata().await.ok();
                    let kind = match &meta {
                        Some(m) if m.is_dir() => "dir",
                        Some(m) if m.is_file() => "file",
                        _ => "other",
                    };
                    let size = meta.map(|m| m.len()).unwrap_or(0);
                    lines.push(format!("{} [{kind}] {size}B", entry.file_name().to_string_lossy()));
                }
                Ok(None) => break,
                Err(err) => return ToolContent::Error(format!("error reading directory entry: {err}")),
            }
        }
        ToolContent::Text(lines.join("\n"))
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
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let safety = Arc::new(SafetyGate::new(SafetyConfig::default()));
        let write = FileWriteTool::new(safety.clone());
        let read = FileReadTool::new(safety);

        let result = write
            .call(serde_json::json!({"path": path.to_str().unwrap(), "content": "hello"}), &ctx())
            .await;
        assert!(!result.is_error());

        let result = read.call(serde_json::json!({"path": path.to_str().unwrap()}), &ctx()).await;
        assert!(matches!(result, ToolContent::Text(t) if t == "hello"));
    }

    #[tokio::test]
    async fn disallowed_path_is_refused() {
        let mut config = SafetyConfig::default();
        config.allowed_paths = vec![std::path::PathBuf::from("/tmp/allowed-only")];
        let read = FileReadTool::new(Arc::new(SafetyGate::new(config)));
        let result = read.call(serde_json::json!({"path": "/etc/passwd"}), &ctx()).await;
        assert!(result.is_error());
    }
}
