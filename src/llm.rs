//! LLM client: a single Anthropic Messages API caller, driven turn-by-turn
//! by the Agent Loop rather than wrapped in a generic completion-model
//! trait. The Agent Loop needs to see every tool call as it comes back (to
//! enforce the single-tool-call-per-step cap, loop-detection fingerprints,
//! and kill-checks from §4.8) and to append its own `tool_result` blocks
//! before the next turn, so the request/response shapes here are the raw
//! ones the wire protocol uses, not an intermediate abstraction.

pub mod manager;
pub mod pricing;

pub use manager::{LlmManager, LlmTier};

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// One turn's worth of conversation history, Anthropic Messages API shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role")]
pub enum ChatMessage {
    User { content: Vec<ContentBlock> },
    Assistant { content: Vec<ContentBlock> },
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        ChatMessage::User { content: vec![ContentBlock::Text { text: text.into() }] }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ChatMessage::User {
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }],
        }
    }
}

/// A single content block. `ToolResult` only ever appears inside a `User`
/// message (it's how a tool's output gets fed back to the model); `ToolUse`
/// only ever appears inside an `Assistant` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

/// A tool definition as advertised to the model, converted 1:1 from
/// [`crate::tools::ToolSpec`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl From<&crate::tools::ToolSpec> for ToolDefinition {
    fn from(spec: &crate::tools::ToolSpec) -> Self {
        ToolDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.schema.clone(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_input_tokens: u64,
}

/// One completed turn: the assistant's content blocks, why it stopped, and
/// token usage (for the cost estimate in [`pricing::estimate_cost`]).
#[derive(Debug, Clone)]
pub struct CompletionTurn {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl CompletionTurn {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
                _ => None,
            })
            .collect()
    }
}

/// A single Anthropic-backed client. One instance is shared across the
/// Brain and every specialist; each call passes its own model id, system
/// prompt, and tool list so the Brain and specialists can run different
/// models against the same client (`BrainConfig::model` vs
/// `AgentLlmConfig::model`).
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client builds with static config"),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    pub async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: Option<u32>,
    ) -> Result<CompletionTurn> {
        let mut body = serde_json::json!({
            "model": model,
            "system": system,
            "messages": messages,
            "max_tokens": max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools).map_err(|e| LlmError::CompletionFailed(e.to_string()))?;
        }

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderRequest(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ProviderRequest(format!("failed to read response body: {e}")))?;
        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::CompletionFailed(format!("response ({status}) is not valid JSON: {e}")))?;

        if !status.is_success() {
            let message = parsed["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(LlmError::ProviderRequest(format!("Anthropic API error ({status}): {message}")).into());
        }

        parse_completion(parsed)
    }
}

fn parse_completion(body: serde_json::Value) -> Result<CompletionTurn> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| LlmError::CompletionFailed("missing content array".into()))?;

    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => content.push(ContentBlock::Text { text: block["text"].as_str().unwrap_or_default().to_string() }),
            Some("tool_use") => content.push(ContentBlock::ToolUse {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                input: block["input"].clone(),
            }),
            _ => {}
        }
    }

    let stop_reason = match body["stop_reason"].as_str() {
        Some("end_turn") => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::Other,
    };

    let usage = Usage {
        input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
        output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
        cached_input_tokens: body["usage"]["cache_read_input_tokens"].as_u64().unwrap_or(0),
    };

    Ok(CompletionTurn { content, stop_reason, usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_tool_use_blocks() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "let me check"},
                {"type": "tool_use", "id": "call_1", "name": "run_quick_command", "input": {"command": "ls"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 100, "output_tokens": 20, "cache_read_input_tokens": 10}
        });
        let turn = parse_completion(body).unwrap();
        assert_eq!(turn.text(), "let me check");
        assert_eq!(turn.stop_reason, StopReason::ToolUse);
        let calls = turn.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "run_quick_command");
        assert_eq!(turn.usage.cached_input_tokens, 10);
    }

    #[test]
    fn missing_content_array_is_a_typed_error() {
        let result = parse_completion(serde_json::json!({"stop_reason": "end_turn"}));
        assert!(result.is_err());
    }
}
