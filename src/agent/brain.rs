//! The Brain (§4.10): a top-level Agent Loop with first-party tools plus
//! one `deploy_<agent>` tool per specialist, a rolling conversation history,
//! and batch-classification hints fed in as extra context rather than as
//! special-cased control flow inside the loop itself.

use super::loop_::{AgentLoop, AgentLoopConfig, LoopOutcome};
use super::KillSwitch;
use crate::conversation::history::HistoryStore;
use crate::llm::LlmTier;
use crate::stream_parser::{Batch, BatchType};
use crate::tools::ToolContext;
use crate::{AgentDeps, ChannelId};
use std::sync::Arc;

pub struct Brain {
    agent_loop: AgentLoop,
    deps: AgentDeps,
    history: Arc<HistoryStore>,
    max_history_turns: i64,
}

impl Brain {
    pub fn new(
        tool_names: Vec<String>,
        max_steps: u32,
        deps: AgentDeps,
        kill: KillSwitch,
        history: Arc<HistoryStore>,
        max_history_turns: i64,
    ) -> Self {
        let deps = AgentDeps {
            agent_id: crate::AgentId::from("brain"),
            ..deps
        };
        let config = AgentLoopConfig {
            tier: LlmTier::Brain,
            model_override: None,
            system_prompt: crate::prompts::BRAIN.to_string(),
            tool_names,
            max_steps,
            on_start: None,
        };
        Self {
            agent_loop: AgentLoop::new(config, deps.clone(), kill),
            deps,
            history,
            max_history_turns,
        }
    }

    /// Runs one coalesced batch through the Brain's Agent Loop, on the named
    /// thread `channel_id`. Persists the turn afterward regardless of
    /// outcome so a `stuck` result is still visible in the rolling history.
    pub async fn process(&self, channel_id: &ChannelId, batch: &Batch, ctx: &ToolContext) -> LoopOutcome {
        let hint = match batch.batch_type {
            BatchType::Correction => Some(
                "The owner is correcting their previous message. Replace the prior plan rather than extending it.",
            ),
            BatchType::Addition => Some(
                "The owner is adding to their previous message. Extend the prior plan rather than starting over.",
            ),
            BatchType::Single | BatchType::MultiTask => None,
        };

        let recent = self.history.load_recent(channel_id, self.max_history_turns).await.unwrap_or_default();
        let history_text: String = recent
            .iter()
            .filter_map(|turn| {
                turn.outbound_response
                    .as_ref()
                    .map(|reply| format!("owner: {}\nyou: {}", turn.inbound_message, reply))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let memory_summary = self.deps.memory.get_context_summary().await;

        let mut context_sections = Vec::new();
        if let Some(hint) = hint {
            context_sections.push(hint.to_string());
        }
        if !memory_summary.trim().is_empty() {
            context_sections.push(memory_summary);
        }
        if !history_text.is_empty() {
            context_sections.push(format!("Recent conversation on this thread:\n{history_text}"));
        }
        let context = context_sections.join("\n\n");
        let context = if context.is_empty() { None } else { Some(context.as_str()) };

        let outcome = self.agent_loop.run(&batch.merged_text, context, ctx).await;

        if let Ok(sequence) = self.history.next_sequence(channel_id).await {
            let _ = self.history.save_turn(channel_id, sequence, &batch.merged_text, Some(&outcome.content)).await;
        }

        outcome
    }
}
