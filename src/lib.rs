//! Spacebot: a personal-assistant orchestration engine. A Brain agent reads
//! inbound messages, dispatches specialist agents and parallel tasks, and
//! replies through whichever channel the message arrived on.

pub mod agent;
pub mod comms;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod event_bus;
pub mod heal;
pub mod llm;
pub mod memory;
pub mod messaging;
pub mod prompts;
pub mod safety;
pub mod stream_parser;
#[cfg(feature = "metrics")]
pub mod telemetry;
pub mod tools;
pub mod tunnel;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier for a specialist agent role, e.g. `"brain"`, `"coder"`, `"researcher"`.
pub type AgentId = Arc<str>;

/// Identifier for a named conversation thread kept by the Brain.
pub type ChannelId = Arc<str>;

/// Identifier for a unit of work handed to the Parallel Task Dispatcher.
pub type TaskId = Uuid;

/// Events published on the Event Bus. Every subsystem that wants visibility
/// into what the rest of the system is doing subscribes to a broadcast
/// receiver of this type; nothing downstream of the bus depends on who
/// published an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AgentStarted {
        agent_id: AgentId,
        channel_id: Option<ChannelId>,
        task: String,
    },
    AgentStep {
        agent_id: AgentId,
        channel_id: Option<ChannelId>,
        step: u32,
    },
    AgentCompleted {
        agent_id: AgentId,
        channel_id: Option<ChannelId>,
        result: String,
        success: bool,
    },
    ToolCalled {
        agent_id: AgentId,
        channel_id: Option<ChannelId>,
        tool_name: String,
        args: String,
    },
    ToolCompleted {
        agent_id: AgentId,
        channel_id: Option<ChannelId>,
        tool_name: String,
        result: String,
        success: bool,
    },
    MemorySaved {
        agent_id: AgentId,
        category: String,
        key: String,
    },
    TaskStarted {
        task_id: TaskId,
        description: String,
    },
    TaskProgress {
        task_id: TaskId,
        message: String,
    },
    TaskCompleted {
        task_id: TaskId,
        success: bool,
        result: String,
    },
    HandoffSent {
        from_agent_id: AgentId,
        to_agent_id: AgentId,
    },
    HealProposed {
        fingerprint: String,
        description: String,
    },
    HealApplied {
        fingerprint: String,
        success: bool,
    },
    StatusUpdate {
        agent_id: AgentId,
        status: String,
    },
}

/// Shared dependency bundle handed to every specialist agent invocation.
#[derive(Clone)]
pub struct AgentDeps {
    pub agent_id: AgentId,
    pub memory: Arc<memory::MemoryStore>,
    pub llm_manager: Arc<llm::LlmManager>,
    pub comms: Arc<comms::Comms>,
    pub safety: Arc<safety::SafetyGate>,
    pub tools: Arc<tools::ToolServerHandle>,
    pub runtime_config: Arc<config::RuntimeConfig>,
    pub event_bus: Arc<event_bus::EventBus>,
}

/// Inbound message from any messaging source (iMessage poller, web dashboard).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: u64,
    pub source: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: MessageContent,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Message content variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Media {
        text: Option<String>,
        attachments: Vec<Attachment>,
    },
}

impl std::fmt::Display for MessageContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageContent::Text(text) => write!(f, "{}", text),
            MessageContent::Media { text, .. } => {
                if let Some(t) = text {
                    write!(f, "{}", t)
                } else {
                    write!(f, "[media]")
                }
            }
        }
    }
}

/// File attachment metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub url: String,
    pub size_bytes: Option<u64>,
}

/// Outbound response to a messaging source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundResponse {
    Text(String),
    /// Send a file attachment to the user.
    File {
        filename: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        mime_type: String,
        caption: Option<String>,
    },
    StreamStart,
    StreamChunk(String),
    StreamEnd,
    Status(StatusUpdate),
}

/// Serde helper for encoding `Vec<u8>` as base64 in JSON.
mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

/// Status updates pushed alongside a reply (e.g. to a dashboard SSE stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusUpdate {
    Thinking,
    StopTyping,
    ToolStarted { tool_name: String },
    ToolCompleted { tool_name: String },
    TaskStarted { task_id: TaskId, description: String },
    TaskCompleted { task_id: TaskId, result: String },
}
