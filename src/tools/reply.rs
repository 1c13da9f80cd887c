//! `send_message`: the first-party tool an agent uses to reply to the
//! owner. Routes through [`ToolContext::reply_tx`] rather than returning
//! text for the Brain to forward itself, and flips
//! [`ToolContext::replied_flag`] so the Dispatcher's safety net (§4.11 step
//! 6 / §10.7) knows a first-party send already happened and doesn't send a
//! second, redundant reply.

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::OutboundResponse;
use std::sync::atomic::Ordering;

pub struct SendMessageTool;

#[async_trait::async_trait]
impl ToolHandler for SendMessageTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "send_message".into(),
            description: "Send a text message back to the owner on the channel this \
                conversation arrived on."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolContext) -> ToolContent {
        let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
            return ToolContent::Error("missing required field: text".into());
        };
        if text.trim().is_empty() {
            return ToolContent::Error("refusing to send an empty message".into());
        }

        let Some(reply_tx) = &ctx.reply_tx else {
            return ToolContent::Error("no reply channel available in this context".into());
        };

        match reply_tx.send(OutboundResponse::Text(text.to_string())).await {
            Ok(()) => {
                if let Some(flag) = &ctx.replied_flag {
                    flag.store(true, Ordering::SeqCst);
                }
                ToolContent::Text("Message sent.".into())
            }
            Err(err) => ToolContent::Error(format!("failed to send message: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn ctx(reply_tx: Option<mpsc::Sender<OutboundResponse>>, flag: Option<Arc<AtomicBool>>) -> ToolContext {
        ToolContext {
            agent_id: crate::AgentId::from("brain"),
            channel_id: crate::ChannelId::from("test"),
            task_id: None,
            conversation_id: "test:1".into(),
            reply_tx,
            replied_flag: flag,
        }
    }

    #[tokio::test]
    async fn sends_text_and_sets_replied_flag() {
        let (tx, mut rx) = mpsc::channel(4);
        let flag = Arc::new(AtomicBool::new(false));
        let tool = SendMessageTool;
        let result = tool.call(serde_json::json!({"text": "hi there"}), &ctx(Some(tx), Some(flag.clone()))).await;
        assert!(!result.is_error());
        assert!(flag.load(Ordering::SeqCst));
        match rx.recv().await {
            Some(OutboundResponse::Text(t)) => assert_eq!(t, "hi there"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refuses_empty_message() {
        let (tx, _rx) = mpsc::channel(4);
        let tool = SendMessageTool;
        let result = tool.call(serde_json::json!({"text": "   "}), &ctx(Some(tx), None)).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn errors_without_a_reply_channel() {
        let tool = SendMessageTool;
        let result = tool.call(serde_json::json!({"text": "hi"}), &ctx(None, None)).await;
        assert!(result.is_error());
    }
}
