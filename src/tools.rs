//! Tool Registry and Executor (§4.5).
//!
//! A tool is a name, a JSON-Schema-like input spec, a description, and a
//! handler, looked up through a `map<string, Handler>` rather than modeled as
//! distinct Rust types per tool (per the redesign note in spec §9: dynamic
//! tool dispatch is data, not a type hierarchy). The registry dispatches by
//! name, emits `ToolCalled`/`ToolCompleted` events, and records every call
//! into the Memory Store's action log.

pub mod deploy;
pub mod exec;
pub mod file;
pub mod memory_delete;
pub mod memory_list;
pub mod memory_recall;
pub mod memory_save;
pub mod reply;
pub mod shell;
pub mod terminal;

use crate::error::{Result, ToolError};
use crate::event_bus::EventBus;
use crate::memory::MemoryStore;
use crate::{AgentId, ChannelId, OutboundResponse, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A single tool's signature, as advertised to the LLM.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped object: `{"type": "object", "properties": {...}, "required": [...]}`.
    pub schema: serde_json::Value,
}

/// A tool's result, modeled as a tagged sum per spec §9 ("Vision tool
/// results"): most tools return text, screen-understanding tools may return
/// an image with a caption, and handler failures are carried as `Error`
/// rather than raised — callers stringify and prefix with `ERROR:` per §7.
#[derive(Debug, Clone)]
pub enum ToolContent {
    Text(String),
    Image { bytes: Vec<u8>, mime: String, caption: String },
    Error(String),
}

impl ToolContent {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolContent::Error(_))
    }

    /// A short, LLM- and log-friendly rendering of this result.
    pub fn as_text_preview(&self) -> String {
        match self {
            ToolContent::Text(t) => t.clone(),
            ToolContent::Image { caption, .. } => format!("[image] {caption}"),
            ToolContent::Error(e) => format!("ERROR: {e}"),
        }
    }
}

/// Per-call context handed to a tool handler: everything it needs beyond its
/// own arguments. Distinct from [`crate::AgentDeps`] because it also carries
/// per-task routing (the reply channel a `send_message`-style tool must use,
/// per §4.5's "reply source" requirement) that does not belong to the
/// long-lived agent dependency bundle.
#[derive(Clone)]
pub struct ToolContext {
    pub agent_id: AgentId,
    pub channel_id: ChannelId,
    pub task_id: Option<TaskId>,
    pub conversation_id: String,
    /// Where an outbound reply from this call should go. `None` for
    /// specialist agents that have no direct user-facing channel.
    pub reply_tx: Option<mpsc::Sender<OutboundResponse>>,
    /// Set to `true` the moment any first-party send succeeds, so the
    /// Dispatcher's safety net (§4.11 step 6 / §10.7) knows not to double-reply.
    pub replied_flag: Option<Arc<std::sync::atomic::AtomicBool>>,
}

/// Object-safe tool handler. One implementation per tool; registered by name.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> ToolContent;
}

/// The Tool Registry / Executor. Cheap to clone: the handler map is
/// reference-counted, so every specialist agent and the Brain can hold their
/// own bound view (a name subset) over the same underlying handlers.
#[derive(Clone)]
pub struct ToolServerHandle {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn ToolHandler>>>>,
    memory: Arc<MemoryStore>,
    event_bus: Arc<EventBus>,
}

impl ToolServerHandle {
    pub fn new(memory: Arc<MemoryStore>, event_bus: Arc<EventBus>) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            memory,
            event_bus,
        }
    }

    pub async fn register(&self, handler: Arc<dyn ToolHandler>) {
        let name = handler.spec().name.clone();
        self.handlers.write().await.insert(name, handler);
    }

    pub async fn specs(&self, names: &[String]) -> Vec<ToolSpec> {
        let handlers = self.handlers.read().await;
        names
            .iter()
            .filter_map(|n| handlers.get(n).map(|h| h.spec()))
            .collect()
    }

    pub async fn all_specs(&self) -> Vec<ToolSpec> {
        self.handlers.read().await.values().map(|h| h.spec()).collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    /// Dispatch `tool_name(args)`, emitting events and recording the action
    /// log entry. Unknown tool names translate to a typed error result, never
    /// a Rust error propagated up the call stack (§7, §9).
    pub async fn dispatch(&self, tool_name: &str, args: serde_json::Value, ctx: &ToolContext) -> ToolContent {
        let args_preview = truncate(&args.to_string(), 300);
        self.event_bus.publish(crate::Event::ToolCalled {
            agent_id: ctx.agent_id.clone(),
            channel_id: Some(ctx.channel_id.clone()),
            tool_name: tool_name.to_string(),
            args: args_preview,
        });

        let handler = self.handlers.read().await.get(tool_name).cloned();
        let result = match handler {
            Some(handler) => handler.call(args.clone(), ctx).await,
            None => ToolContent::Error(ToolError::UnknownTool(tool_name.to_string()).to_string()),
        };

        let success = !result.is_error();
        let preview = result.as_text_preview();
        self.event_bus.publish(crate::Event::ToolCompleted {
            agent_id: ctx.agent_id.clone(),
            channel_id: Some(ctx.channel_id.clone()),
            tool_name: tool_name.to_string(),
            result: truncate(&preview, 300),
            success,
        });
        self.memory
            .log_action(tool_name, &args.to_string(), &preview, success)
            .await;

        result
    }

    /// Convenience wrapper for call sites (tests, `deploy_*` handlers) that
    /// don't need the full event/log side effects.
    pub async fn lookup(&self, name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()).into())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    struct EchoTool;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: "echoes its input".into(),
                schema: serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
            }
        }
        async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
            ToolContent::Text(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    async fn registry() -> ToolServerHandle {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        ToolServerHandle::new(memory, Arc::new(EventBus::new()))
    }

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: AgentId::from("tester"),
            channel_id: ChannelId::from("test"),
            task_id: None,
            conversation_id: "test:1".into(),
            reply_tx: None,
            replied_flag: None,
        }
    }

    #[tokio::test]
    async fn dispatch_routes_to_registered_handler() {
        let registry = registry().await;
        registry.register(Arc::new(EchoTool)).await;
        let result = registry.dispatch("echo", serde_json::json!({"text": "hi"}), &ctx()).await;
        assert!(matches!(result, ToolContent::Text(t) if t == "hi"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_typed_error_not_a_panic() {
        let registry = registry().await;
        let result = registry.dispatch("nonexistent", serde_json::json!({}), &ctx()).await;
        assert!(result.is_error());
    }
}
