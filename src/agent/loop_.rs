//! The generic Agent Loop (§4.8): a cooperative state machine driving an
//! LLM with a fixed tool set toward a `done` or `stuck` terminal. Both the
//! Brain and every specialist are bindings over this one type.

use super::KillSwitch;
use crate::llm::{ChatMessage, LlmTier, StopReason, ToolDefinition};
use crate::tools::{terminal::evaluate_done_guard, ToolContext};
use crate::{AgentDeps, Event};
use std::collections::VecDeque;
use std::time::Duration;

/// A loop-detection fingerprint: same tool, same canonical args.
type Fingerprint = (String, String);

const LOOP_THRESHOLD: usize = 3;
const LOOP_WINDOW: usize = 6;
/// Tools whose success is followed by a brief pause + refreshed observation,
/// so the model sees the effect of its own action before acting again.
const NAVIGATION_LIKE_TOOLS: &[&str] = &["open_url", "click", "navigate", "run_process"];

/// What an Agent Loop run ended in.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub success: bool,
    pub stuck: bool,
    pub content: String,
}

impl LoopOutcome {
    fn done(content: String) -> Self {
        Self { success: true, stuck: false, content }
    }

    fn stuck(reason: String) -> Self {
        Self { success: false, stuck: true, content: reason }
    }
}

/// An optional setup step run once, before step 1, with access to the same
/// [`ToolContext`] the loop's tool calls will use (e.g. the Browser
/// specialist lazily starting its driver, the Screen specialist snapshotting
/// the target app).
#[async_trait::async_trait]
pub trait OnStartHook: Send + Sync {
    async fn on_start(&self, ctx: &ToolContext) -> Option<String>;
}

/// Static configuration for one Agent Loop invocation: which model tier,
/// which tools, how many steps, what prompt.
pub struct AgentLoopConfig {
    pub tier: LlmTier,
    pub model_override: Option<String>,
    pub system_prompt: String,
    pub tool_names: Vec<String>,
    pub max_steps: u32,
    pub on_start: Option<std::sync::Arc<dyn OnStartHook>>,
}

pub struct AgentLoop {
    config: AgentLoopConfig,
    deps: AgentDeps,
    kill: KillSwitch,
}

impl AgentLoop {
    pub fn new(config: AgentLoopConfig, deps: AgentDeps, kill: KillSwitch) -> Self {
        Self { config, deps, kill }
    }

    /// Runs the loop to completion against one task. `context` is prepended
    /// to the task text when present (a handoff summary, a correction hint,
    /// whatever the caller assembled).
    pub async fn run(&self, task: &str, context: Option<&str>, ctx: &ToolContext) -> LoopOutcome {
        self.deps.event_bus.publish(Event::AgentStarted {
            agent_id: self.deps.agent_id.clone(),
            channel_id: Some(ctx.channel_id.clone()),
            task: task.to_string(),
        });

        let outcome = self.run_inner(task, context, ctx).await;

        self.deps.event_bus.publish(Event::AgentCompleted {
            agent_id: self.deps.agent_id.clone(),
            channel_id: Some(ctx.channel_id.clone()),
            result: outcome.content.clone(),
            success: outcome.success,
        });
        outcome
    }

    async fn run_inner(&self, task: &str, context: Option<&str>, ctx: &ToolContext) -> LoopOutcome {
        let tool_specs = self.deps.tools.specs(&self.config.tool_names).await;
        let tool_defs: Vec<ToolDefinition> = tool_specs.iter().map(ToolDefinition::from).collect();

        let opening = match context {
            Some(c) if !c.trim().is_empty() => format!("{c}\n\nTask: {task}"),
            _ => task.to_string(),
        };
        let mut history = vec![ChatMessage::user_text(opening)];

        let mut fingerprints: VecDeque<Fingerprint> = VecDeque::with_capacity(LOOP_WINDOW);
        let mut actions_taken: u32 = 0;
        let mut actions_errored: u32 = 0;

        if let Some(hook) = self.config.on_start.clone() {
            if let Some(note) = hook.on_start(ctx).await {
                history.push(ChatMessage::user_text(note));
            }
        }

        for step in 1..=self.config.max_steps {
            if self.kill.is_set() {
                return LoopOutcome::stuck("kill".into());
            }

            self.deps.event_bus.publish(Event::AgentStep {
                agent_id: self.deps.agent_id.clone(),
                channel_id: Some(ctx.channel_id.clone()),
                step,
            });

            let turn = match self
                .deps
                .llm_manager
                .complete(self.config.tier, self.config.model_override.as_deref(), &self.config.system_prompt, &history, &tool_defs)
                .await
            {
                Ok(turn) => turn,
                Err(err) => {
                    // One blind retry for a transient failure, then give up.
                    match self
                        .deps
                        .llm_manager
                        .complete(self.config.tier, self.config.model_override.as_deref(), &self.config.system_prompt, &history, &tool_defs)
                        .await
                    {
                        Ok(turn) => turn,
                        Err(_) => return LoopOutcome::stuck(format!("api_error: {err}")),
                    }
                }
            };

            history.push(ChatMessage::Assistant { content: turn.content.clone() });

            let calls = turn.tool_calls();
            if calls.is_empty() {
                if turn.stop_reason == StopReason::EndTurn {
                    history.push(ChatMessage::user_text(
                        "Use one of your tools to make progress, or call done/stuck if you're finished.",
                    ));
                    continue;
                }
                continue;
            }

            // Hard cap of one tool call acted on per step (§4.8 step 4); any
            // further tool_use blocks in the same turn still need a
            // tool_result or the next request is malformed, so they get a
            // skipped placeholder instead of being silently dropped.
            let (primary_id, primary_name, primary_args) = calls[0];
            let mut result_blocks = Vec::with_capacity(calls.len());

            if primary_name == "stuck" {
                let reason = primary_args.get("reason").and_then(|v| v.as_str()).unwrap_or_default();
                let reason = crate::tools::terminal::synthesize_stuck_reason(reason, step, None);
                return LoopOutcome::stuck(reason);
            }

            if primary_name == "done" {
                let last_state = primary_args.get("state").and_then(|v| v.as_str());
                match evaluate_done_guard(&self.deps.runtime_config.done_guard.load(), actions_taken, actions_errored, last_state) {
                    crate::tools::terminal::DoneGuardVerdict::Accepted => {
                        let summary = primary_args.get("summary").and_then(|v| v.as_str()).unwrap_or("(no summary provided)");
                        return LoopOutcome::done(summary.to_string());
                    }
                    crate::tools::terminal::DoneGuardVerdict::Rejected(reason) => {
                        result_blocks.push(ChatMessage::tool_result(primary_id, format!("done rejected: {reason}"), true));
                    }
                }
            } else {
                let canonical_args = primary_args.to_string();
                let fingerprint: Fingerprint = (primary_name.to_string(), canonical_args);
                if fingerprints.len() == LOOP_WINDOW {
                    fingerprints.pop_front();
                }
                fingerprints.push_back(fingerprint.clone());
                let repeats = fingerprints.iter().filter(|f| **f == fingerprint).count();

                let result = self.deps.tools.dispatch(primary_name, primary_args.clone(), ctx).await;
                actions_taken += 1;
                if result.is_error() {
                    actions_errored += 1;
                }

                let mut preview = result.as_text_preview();
                if repeats >= LOOP_THRESHOLD {
                    preview.push_str(&format!(
                        "\n\n[loop warning: {primary_name} has now been called with identical arguments {repeats} times recently; try a different approach or call stuck]"
                    ));
                }
                result_blocks.push(ChatMessage::tool_result(primary_id, preview, result.is_error()));

                if NAVIGATION_LIKE_TOOLS.contains(&primary_name) && !result.is_error() {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
            }

            for (id, name, _) in calls.iter().skip(1) {
                result_blocks.push(ChatMessage::tool_result(
                    *id,
                    format!("skipped: only one tool call ({primary_name}) is processed per step; {name} was not run"),
                    true,
                ));
            }

            history.extend(result_blocks);
        }

        LoopOutcome::stuck("hit max steps".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::Comms;
    use crate::config::{Config, MemoryConfig, RuntimeConfig};
    use crate::event_bus::EventBus;
    use crate::memory::MemoryStore;
    use crate::safety::SafetyGate;
    use crate::tools::ToolServerHandle;
    use std::sync::Arc;

    async fn deps() -> AgentDeps {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default()).await.unwrap());
        let event_bus = Arc::new(EventBus::new());
        let tools = Arc::new(ToolServerHandle::new(memory.clone(), event_bus.clone()));

        let mut config = Config::default();
        config.brain.api_key = Some("test-key".into());
        config.agent_llm.api_key = Some("test-key".into());

        AgentDeps {
            agent_id: crate::AgentId::from("tester"),
            memory,
            llm_manager: Arc::new(crate::llm::LlmManager::new(&config).unwrap()),
            comms: Arc::new(Comms::new()),
            safety: Arc::new(SafetyGate::new(config.safety.clone())),
            tools,
            runtime_config: Arc::new(RuntimeConfig::new(&config)),
            event_bus,
        }
    }

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
    async fn kill_switch_short_circuits_before_any_llm_call() {
        let deps = deps().await;
        let kill = KillSwitch::new();
        kill.set();
        let config = AgentLoopConfig {
            tier: LlmTier::Agent,
            model_override: None,
            system_prompt: "test".into(),
            tool_names: vec![],
            max_steps: 5,
            on_start: None,
        };
        let agent_loop = AgentLoop::new(config, deps, kill);
        let outcome = agent_loop.run("do a thing", None, &ctx()).await;
        assert!(outcome.stuck);
        assert_eq!(outcome.content, "kill");
    }
}
