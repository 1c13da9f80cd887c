//! Self-Heal Engine (§4.12): tracks repeated failure fingerprints, proposes a
//! fix to the owner, and on an explicit "yes" reply dispatches the dev
//! specialist to attempt it. Never applies anything without that approval.

use crate::tools::deploy::SpecialistRunner;
use crate::tools::ToolContext;
use crate::{AgentId, ChannelId, Event};
use crate::event_bus::EventBus;
use crate::OutboundResponse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Same fingerprint seen this many times triggers a healing proposal.
const REPEAT_THRESHOLD: u32 = 2;

struct PendingProposal {
    fingerprint: String,
    dev_task: String,
}

pub struct HealEngine {
    dev: Arc<dyn SpecialistRunner>,
    event_bus: Arc<EventBus>,
    yes_phrases: Vec<String>,
    counts: Mutex<HashMap<String, u32>>,
    pending: Mutex<HashMap<ChannelId, PendingProposal>>,
}

impl HealEngine {
    pub fn new(dev: Arc<dyn SpecialistRunner>, event_bus: Arc<EventBus>, yes_phrases: Vec<String>) -> Self {
        Self {
            dev,
            event_bus,
            yes_phrases,
            counts: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Records one observed failure. Below `REPEAT_THRESHOLD` this is a
    /// silent bookkeeping update; at/after threshold it sends a proposal to
    /// the owner and remembers it as pending approval on `channel_id`.
    pub async fn record_failure(
        &self,
        tool_name: &str,
        error_kind: &str,
        error_text: &str,
        channel_id: ChannelId,
        reply_tx: mpsc::Sender<OutboundResponse>,
    ) {
        let fingerprint = fingerprint(tool_name, error_kind);
        let count = {
            let mut counts = self.counts.lock().await;
            let entry = counts.entry(fingerprint.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if count < REPEAT_THRESHOLD {
            return;
        }

        let description = format!(
            "'{tool_name}' has failed the same way ({error_kind}) {count} times. Most recent: {error_text}"
        );
        let dev_task = format!(
            "Investigate and fix repeated '{tool_name}' failures of kind '{error_kind}'. Most recent error: {error_text}"
        );

        self.event_bus.publish(Event::HealProposed {
            fingerprint: fingerprint.clone(),
            description: description.clone(),
        });

        self.pending.lock().await.insert(channel_id, PendingProposal { fingerprint, dev_task });

        let prompt = format!("{description}\n\nReply yes if you'd like me to have the dev agent attempt a fix.");
        if let Err(err) = reply_tx.send(OutboundResponse::Text(prompt)).await {
            tracing::warn!(%err, "failed to send heal proposal");
        }
    }

    /// Checks `text` against this channel's pending proposal (if any) for an
    /// explicit "yes". If it matches, dispatches the dev specialist and
    /// reports the outcome, returning `true` so the caller knows not to
    /// forward `text` to the Brain as an ordinary message. Returns `false`
    /// when there's no pending proposal, or `text` doesn't read as approval.
    pub async fn maybe_handle_approval(&self, channel_id: &ChannelId, text: &str, reply_tx: mpsc::Sender<OutboundResponse>) -> bool {
        if !self.reads_as_yes(text) {
            return false;
        }
        let Some(pending) = self.pending.lock().await.remove(channel_id) else {
            return false;
        };

        let ctx = ToolContext {
            agent_id: AgentId::from("dev"),
            channel_id: channel_id.clone(),
            task_id: None,
            conversation_id: format!("heal:{channel_id}"),
            reply_tx: Some(reply_tx.clone()),
            replied_flag: None,
        };

        let result = self.dev.run(pending.dev_task.clone(), None, &ctx).await;
        let success = !result.is_error();

        self.event_bus.publish(Event::HealApplied {
            fingerprint: pending.fingerprint,
            success,
        });

        let summary = format!("Heal outcome: {}", result.as_text_preview());
        if let Err(err) = reply_tx.send(OutboundResponse::Text(summary)).await {
            tracing::warn!(%err, "failed to send heal outcome");
        }

        true
    }

    fn reads_as_yes(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        self.yes_phrases.iter().any(|phrase| lower == phrase.to_lowercase() || lower.contains(&phrase.to_lowercase()))
    }
}

fn fingerprint(tool_name: &str, error_kind: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(format!("{tool_name}:{error_kind}").as_bytes());
    hex::encode(&digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolContent;

    struct DevStub {
        result: ToolContent,
    }

    #[async_trait::async_trait]
    impl SpecialistRunner for DevStub {
        async fn run(&self, _task: String, _context: Option<String>, _ctx: &ToolContext) -> ToolContent {
            self.result.clone()
        }
    }

    fn engine(dev_result: ToolContent) -> HealEngine {
        HealEngine::new(
            Arc::new(DevStub { result: dev_result }),
            Arc::new(EventBus::new()),
            vec!["yes".into(), "go ahead".into()],
        )
    }

    #[tokio::test]
    async fn proposal_fires_only_at_the_repeat_threshold() {
        let engine = engine(ToolContent::Text("fixed it".into()));
        let (tx, mut rx) = mpsc::channel(8);
        let channel = ChannelId::from("owner");

        engine.record_failure("run_process", "timeout", "boom", channel.clone(), tx.clone()).await;
        assert!(rx.try_recv().is_err(), "first failure should not propose yet");

        engine.record_failure("run_process", "timeout", "boom again", channel.clone(), tx).await;
        let message = rx.recv().await.unwrap();
        match message {
            OutboundResponse::Text(t) => assert!(t.contains("run_process")),
            _ => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn approval_dispatches_dev_agent_and_clears_pending() {
        let engine = engine(ToolContent::Text("patched".into()));
        let (tx, mut rx) = mpsc::channel(8);
        let channel = ChannelId::from("owner");

        engine.record_failure("run_process", "timeout", "e1", channel.clone(), tx.clone()).await;
        engine.record_failure("run_process", "timeout", "e2", channel.clone(), tx.clone()).await;
        rx.recv().await.unwrap(); // the proposal message

        let handled = engine.maybe_handle_approval(&channel, "yes", tx.clone()).await;
        assert!(handled);
        let outcome = rx.recv().await.unwrap();
        match outcome {
            OutboundResponse::Text(t) => assert!(t.contains("patched")),
            _ => panic!("expected text"),
        }

        // second "yes" has nothing pending anymore
        assert!(!engine.maybe_handle_approval(&channel, "yes", tx).await);
    }

    #[tokio::test]
    async fn non_yes_reply_does_not_consume_the_pending_proposal() {
        let engine = engine(ToolContent::Text("patched".into()));
        let (tx, mut rx) = mpsc::channel(8);
        let channel = ChannelId::from("owner");

        engine.record_failure("run_process", "timeout", "e1", channel.clone(), tx.clone()).await;
        engine.record_failure("run_process", "timeout", "e2", channel.clone(), tx.clone()).await;
        rx.recv().await.unwrap();

        assert!(!engine.maybe_handle_approval(&channel, "what's going on?", tx.clone()).await);
        assert!(engine.maybe_handle_approval(&channel, "yes", tx).await);
    }
}
