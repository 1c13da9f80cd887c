//! Specialist Agents (§4.9): thin bindings over the Agent Loop. Each one is
//! {name, system prompt, tool list, optional on_start hook}; none hold
//! shared mutable state beyond what [`crate::comms::Comms`] already
//! provides. The Brain builds one [`Specialist`] per configured agent name
//! and wraps each in a [`crate::tools::deploy::DeployTool`].

use super::loop_::{AgentLoop, AgentLoopConfig, OnStartHook};
use super::KillSwitch;
use crate::llm::LlmTier;
use crate::tools::deploy::SpecialistRunner;
use crate::tools::{ToolContent, ToolContext};
use crate::AgentDeps;
use std::sync::Arc;

/// Static shape of one specialist: what it's called, what it's told, and
/// what it's allowed to touch.
pub struct SpecialistSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub tool_names: Vec<String>,
    pub max_steps: u32,
    pub on_start: Option<Arc<dyn OnStartHook>>,
}

/// The research specialist: read-heavy, no write tools.
pub fn research_spec(max_steps: u32) -> SpecialistSpec {
    SpecialistSpec {
        name: "research",
        description: "Finds and synthesizes information across the web and local notes.",
        system_prompt: crate::prompts::RESEARCH,
        tool_names: names(&["done", "stuck", "run_quick_command", "recall_memory", "save_memory"]),
        max_steps,
        on_start: None,
    }
}

/// The coder specialist: filesystem + process tools.
pub fn coder_spec(max_steps: u32) -> SpecialistSpec {
    SpecialistSpec {
        name: "coder",
        description: "Reads and writes code and runs processes on the owner's machine.",
        system_prompt: crate::prompts::CODER,
        tool_names: names(&["done", "stuck", "read_file", "write_file", "list_files", "run_process", "run_quick_command", "recall_memory", "save_memory"]),
        max_steps,
        on_start: None,
    }
}

/// The browser specialist. A real CDP driver is out of scope (§4.9's
/// "thin binding" framing, DESIGN.md's dropped `chromiumoxide`); this is
/// kept at interface level with the generic tool set so its deploy path,
/// loop-detection, and done-guard all exercise real code against whatever
/// concrete browser tool gets registered later.
pub fn browser_spec(max_steps: u32) -> SpecialistSpec {
    SpecialistSpec {
        name: "browser",
        description: "Operates a browser on the owner's behalf.",
        system_prompt: crate::prompts::BROWSER,
        tool_names: names(&["done", "stuck", "run_quick_command", "recall_memory", "save_memory"]),
        max_steps,
        on_start: None,
    }
}

/// The screen specialist, same interface-level scoping as browser.
pub fn screen_spec(max_steps: u32) -> SpecialistSpec {
    SpecialistSpec {
        name: "screen",
        description: "Controls the screen and other native applications.",
        system_prompt: crate::prompts::SCREEN,
        tool_names: names(&["done", "stuck", "run_quick_command", "recall_memory", "save_memory"]),
        max_steps,
        on_start: None,
    }
}

/// The dev specialist, dispatched only by the Self-Heal Engine.
pub fn dev_spec(max_steps: u32) -> SpecialistSpec {
    SpecialistSpec {
        name: "dev",
        description: "Applies an owner-approved self-heal code change.",
        system_prompt: crate::prompts::DEV,
        tool_names: names(&["done", "stuck", "read_file", "write_file", "list_files", "run_process", "recall_memory", "save_memory"]),
        max_steps,
        on_start: None,
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Binds a [`SpecialistSpec`] to a concrete [`AgentLoop`] and exposes it as
/// a [`SpecialistRunner`] the deploy tool can call.
pub struct Specialist {
    agent_loop: AgentLoop,
}

impl Specialist {
    pub fn new(spec: SpecialistSpec, deps: AgentDeps, kill: KillSwitch) -> Self {
        let deps = AgentDeps {
            agent_id: crate::AgentId::from(spec.name),
            ..deps
        };
        let config = AgentLoopConfig {
            tier: LlmTier::Agent,
            model_override: None,
            system_prompt: spec.system_prompt.to_string(),
            tool_names: spec.tool_names,
            max_steps: spec.max_steps,
            on_start: spec.on_start,
        };
        Self { agent_loop: AgentLoop::new(config, deps, kill) }
    }
}

#[async_trait::async_trait]
impl SpecialistRunner for Specialist {
    async fn run(&self, task: String, context: Option<String>, ctx: &ToolContext) -> ToolContent {
        let outcome = self.agent_loop.run(&task, context.as_deref(), ctx).await;
        if outcome.success {
            ToolContent::Text(outcome.content)
        } else {
            ToolContent::Error(outcome.content)
        }
    }
}
