//! `done` and `stuck`: the two terminal tools every Agent Loop tool list
//! carries (§4.8). Calling either ends the loop — but `done` only ends it
//! if [`evaluate_done_guard`] lets it through; the Agent Loop is expected to
//! run that check itself, before ever reaching this handler, so a rejected
//! `done` never leaves the loop and is instead fed back as a tool_result
//! asking the agent to keep going.
//!
//! The handlers here exist so `done`/`stuck` show up like any other tool in
//! the registry (spec listing, event/log plumbing); the guard logic they
//! wrap is exported standalone because the loop needs to call it with its
//! own step/error counters, which a stateless [`super::ToolHandler::call`]
//! has no way to see.

use super::{ToolContent, ToolContext, ToolHandler, ToolSpec};
use crate::config::DoneGuardConfig;

/// Why a `done` call was or wasn't accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoneGuardVerdict {
    Accepted,
    Rejected(String),
}

/// Applies the three independently-configurable guards from §10.6:
/// too-early completion, too-error-prone completion, and (for specialists
/// that declare one) a state-aware success check. `last_state` is `None`
/// for specialists with no such check, which skips guard (c) entirely.
pub fn evaluate_done_guard(
    cfg: &DoneGuardConfig,
    actions_taken: u32,
    actions_errored: u32,
    last_state: Option<&str>,
) -> DoneGuardVerdict {
    if actions_taken < cfg.min_actions {
        return DoneGuardVerdict::Rejected(format!(
            "only {actions_taken} action(s) taken; at least {} are required before declaring done",
            cfg.min_actions
        ));
    }

    if actions_taken > 2 {
        let error_ratio = actions_errored as f32 / actions_taken as f32;
        if error_ratio >= cfg.max_error_ratio {
            return DoneGuardVerdict::Rejected(format!(
                "{actions_errored}/{actions_taken} actions errored, above the {:.0}% threshold",
                cfg.max_error_ratio * 100.0
            ));
        }
    }

    if let Some(state) = last_state {
        let state_lower = state.to_lowercase();
        let matches_failure = cfg.failure_signals.iter().any(|s| state_lower.contains(&s.to_lowercase()));
        let matches_success = cfg.success_signals.iter().any(|s| state_lower.contains(&s.to_lowercase()));
        if matches_failure && !matches_success {
            return DoneGuardVerdict::Rejected(
                "current state still matches a pre-success signal and no success signal".into(),
            );
        }
    }

    DoneGuardVerdict::Accepted
}

const MIN_STUCK_REASON_LEN: usize = 10;

/// Synthesizes a `stuck` reason when the LLM's own explanation is too thin
/// to be useful to whoever reviews it later (§10.6).
pub fn synthesize_stuck_reason(reason: &str, step: u32, last_tool: Option<&str>) -> String {
    if reason.trim().len() >= MIN_STUCK_REASON_LEN {
        return reason.to_string();
    }
    match last_tool {
        Some(tool) => format!("stuck after {step} steps, last tried {tool}"),
        None => format!("stuck after {step} steps"),
    }
}

pub struct DoneTool;
pub struct StuckTool;

#[async_trait::async_trait]
impl ToolHandler for DoneTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "done".into(),
            description: "Declare the task complete and provide a final summary. \
                May be rejected if too few actions were taken or too many errored."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"summary": {"type": "string"}},
                "required": ["summary"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let summary = args.get("summary").and_then(|v| v.as_str()).unwrap_or("(no summary provided)");
        ToolContent::Text(summary.to_string())
    }
}

#[async_trait::async_trait]
impl ToolHandler for StuckTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "stuck".into(),
            description: "Declare that the task cannot proceed and explain why. \
                Used when you are stuck, blocked, or out of options, not merely frustrated."
                .into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}},
                "required": ["reason"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolContext) -> ToolContent {
        let reason = args.get("reason").and_then(|v| v.as_str()).unwrap_or_default();
        ToolContent::Text(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DoneGuardConfig {
        DoneGuardConfig::default()
    }

    #[test]
    fn rejects_when_too_few_actions() {
        let verdict = evaluate_done_guard(&cfg(), 1, 0, None);
        assert!(matches!(verdict, DoneGuardVerdict::Rejected(_)));
    }

    #[test]
    fn rejects_when_error_ratio_too_high() {
        let verdict = evaluate_done_guard(&cfg(), 4, 3, None);
        assert!(matches!(verdict, DoneGuardVerdict::Rejected(_)));
    }

    #[test]
    fn accepts_healthy_completion() {
        let verdict = evaluate_done_guard(&cfg(), 5, 0, None);
        assert_eq!(verdict, DoneGuardVerdict::Accepted);
    }

    #[test]
    fn state_aware_guard_blocks_on_unresolved_failure_signal() {
        let mut c = cfg();
        c.failure_signals = vec!["form still present".into()];
        c.success_signals = vec!["confirmation shown".into()];
        let verdict = evaluate_done_guard(&c, 5, 0, Some("the form still present on screen"));
        assert!(matches!(verdict, DoneGuardVerdict::Rejected(_)));
    }

    #[test]
    fn state_aware_guard_allows_when_success_signal_also_present() {
        let mut c = cfg();
        c.failure_signals = vec!["form still present".into()];
        c.success_signals = vec!["confirmation shown".into()];
        let verdict = evaluate_done_guard(&c, 5, 0, Some("confirmation shown, form still present but greyed out"));
        assert_eq!(verdict, DoneGuardVerdict::Accepted);
    }

    #[test]
    fn short_reason_gets_synthesized() {
        let reason = synthesize_stuck_reason("idk", 7, Some("run_quick_command"));
        assert!(reason.contains('7'));
        assert!(reason.contains("run_quick_command"));
    }

    #[test]
    fn adequate_reason_passes_through() {
        let reason = synthesize_stuck_reason("the API key is invalid and there is no way to refresh it", 3, None);
        assert!(reason.starts_with("the API key"));
    }
}
