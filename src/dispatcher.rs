//! Parallel Task Dispatcher (§4.11): pulls Batches off the queue, runs the
//! Brain on each inside a bounded worker pool, and wraps the run with a
//! Progress Collector and a safety-net reply.

use crate::agent::brain::Brain;
use crate::agent::KillSwitch;
use crate::config::ImessageConfig;
use crate::error::Result;
use crate::event_bus::EventBus;
use crate::heal::HealEngine;
use crate::stream_parser::Batch;
use crate::tools::ToolContext;
use crate::{AgentId, ChannelId, Event, OutboundResponse, TaskId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Semaphore};

/// Sentinel prefixes the Brain's return text carries when it's reporting an
/// unrecovered failure rather than a normal answer (§4.11 step 7).
const ERROR_SENTINELS: &[&str] = &["\u{274c}", "\u{26a0}\u{fe0f}"];
const SAFETY_NET_TRUNCATE_CHARS: usize = 1_500;

pub struct Dispatcher {
    brain: Arc<Brain>,
    event_bus: Arc<EventBus>,
    heal: Arc<HealEngine>,
    kill: KillSwitch,
    semaphore: Arc<Semaphore>,
    progress_interval: Duration,
    heartbeat_silence: Duration,
}

impl Dispatcher {
    pub fn new(brain: Arc<Brain>, event_bus: Arc<EventBus>, heal: Arc<HealEngine>, kill: KillSwitch, max_parallel_tasks: usize, imessage: &ImessageConfig) -> Self {
        Self {
            brain,
            event_bus,
            heal,
            kill,
            semaphore: Arc::new(Semaphore::new(max_parallel_tasks.max(1))),
            progress_interval: Duration::from_secs(imessage.progress_interval_secs),
            heartbeat_silence: Duration::from_secs(imessage.heartbeat_silence_secs),
        }
    }

    /// Reserves a worker slot (blocking until one is free), then spawns the
    /// task and returns immediately with its id. A `MultiTask` batch is
    /// expected to already have been split by the caller into several
    /// `Single` batches, each dispatched separately.
    pub async fn dispatch(self: &Arc<Self>, batch: Batch, channel_id: ChannelId, reply_tx: mpsc::Sender<OutboundResponse>) -> TaskId {
        let permit = self.semaphore.clone().acquire_owned().await.expect("dispatcher semaphore never closes");
        let task_id = TaskId::new_v4();

        self.event_bus.publish(Event::TaskStarted {
            task_id,
            description: batch.merged_text.clone(),
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_task(permit, task_id, batch, channel_id, reply_tx).await;
        });

        task_id
    }

    async fn run_task(
        &self,
        _permit: tokio::sync::OwnedSemaphorePermit,
        task_id: TaskId,
        batch: Batch,
        channel_id: ChannelId,
        reply_tx: mpsc::Sender<OutboundResponse>,
    ) {
        let replied_flag = Arc::new(AtomicBool::new(false));
        let ctx = ToolContext {
            agent_id: AgentId::from("brain"),
            channel_id: channel_id.clone(),
            task_id: Some(task_id),
            conversation_id: format!("{}:{}", batch.source, channel_id),
            reply_tx: Some(reply_tx.clone()),
            replied_flag: Some(replied_flag.clone()),
        };

        let collector = ProgressCollector::spawn(
            self.event_bus.clone(),
            channel_id.clone(),
            reply_tx.clone(),
            self.progress_interval,
            self.heartbeat_silence,
        );

        let outcome = self.brain.process(&channel_id, &batch, &ctx).await;

        collector.stop().await;

        if !replied_flag.load(Ordering::SeqCst) {
            let text = truncate(&outcome.content, SAFETY_NET_TRUNCATE_CHARS);
            if let Err(err) = reply_tx.send(OutboundResponse::Text(text)).await {
                tracing::warn!(%err, "safety-net reply failed to send");
            }
        }

        if is_error_sentinel(&outcome.content) {
            self.heal
                .record_failure("brain", "reported_error", &outcome.content, channel_id.clone(), reply_tx.clone())
                .await;
        }

        self.event_bus.publish(Event::TaskCompleted {
            task_id,
            success: outcome.success,
            result: outcome.content,
        });
    }

    /// Whether calling `dispatch` right now would have to wait for a slot.
    pub fn has_free_slot(&self) -> bool {
        self.semaphore.available_permits() > 0
    }
}

fn is_error_sentinel(text: &str) -> bool {
    let trimmed = text.trim_start();
    ERROR_SENTINELS.iter().any(|s| trimmed.starts_with(s))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("… (truncated)");
    truncated
}

/// Subscribes to the Event Bus for the duration of one task and turns
/// `agent_started`/`agent_completed`/`tool_called`-shaped events into a
/// periodic progress message, or a heartbeat if the task goes quiet.
struct ProgressCollector {
    stop_tx: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl ProgressCollector {
    fn spawn(
        event_bus: Arc<EventBus>,
        channel_id: ChannelId,
        reply_tx: mpsc::Sender<OutboundResponse>,
        interval: Duration,
        heartbeat_after: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mut events = event_bus.subscribe();

        let handle = tokio::spawn(async move {
            let started_at = Instant::now();
            let mut ring: VecDeque<String> = VecDeque::with_capacity(5);
            let mut silent_ticks: u32 = 0;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // interval fires immediately once; skip it

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if ring.is_empty() {
                            silent_ticks += 1;
                            if started_at.elapsed() >= heartbeat_after && silent_ticks >= 2 {
                                let _ = reply_tx.send(OutboundResponse::Text("Still working on it.".into())).await;
                                silent_ticks = 0;
                            }
                        } else {
                            let lines: Vec<String> = ring.drain(..).collect();
                            let message = format!("Progress:\n{}", lines.join("\n"));
                            let _ = reply_tx.send(OutboundResponse::Text(message)).await;
                            silent_ticks = 0;
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                if let Some(line) = describe_if_relevant(&event, &channel_id) {
                                    if ring.len() >= 5 {
                                        ring.pop_front();
                                    }
                                    ring.push_back(line);
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Self { stop_tx, handle }
    }

    async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.await;
    }
}

fn describe_if_relevant(event: &Event, channel_id: &ChannelId) -> Option<String> {
    match event {
        Event::AgentStarted { channel_id: Some(c), agent_id, task, .. } if c == channel_id => {
            Some(format!("started {agent_id}: {task}"))
        }
        Event::AgentCompleted { channel_id: Some(c), agent_id, success, .. } if c == channel_id => {
            Some(format!("{agent_id} finished ({})", if *success { "done" } else { "stuck" }))
        }
        Event::ToolCalled { channel_id: Some(c), tool_name, .. } if c == channel_id => {
            Some(format!("called {tool_name}"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_error_sentinels_at_the_start() {
        assert!(is_error_sentinel("\u{274c} deploy failed"));
        assert!(is_error_sentinel("  \u{26a0}\u{fe0f} partial failure"));
        assert!(!is_error_sentinel("all good"));
    }

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_cuts_long_text_and_marks_it() {
        let long = "a".repeat(50);
        let truncated = truncate(&long, 10);
        assert!(truncated.starts_with(&"a".repeat(10)));
        assert!(truncated.ends_with("(truncated)"));
    }
}
