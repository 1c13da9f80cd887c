//! Inter-Agent Comms: the only channel through which specialist agents pass
//! context to each other. There is no direct agent-to-agent addressing —
//! everything flows through the Brain via a typed scratchpad (append-only,
//! read by anyone) and a single-slot handoff queue per target agent
//! (consume-once, producer-specified).

use crate::error::{CommsError, Result};
use crate::AgentId;
use std::collections::HashMap;
use std::sync::Mutex;

/// A note one agent leaves for another (or for the Brain) when control
/// passes between them.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HandoffContext {
    pub from_agent_id: AgentId,
    pub summary: String,
    pub data: serde_json::Value,
}

/// A single scratchpad entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScratchpadEntry {
    pub agent_id: AgentId,
    pub key: String,
    pub value: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct State {
    /// Append-only log of everything written to the scratchpad, in order.
    scratchpad: Vec<ScratchpadEntry>,
    /// Most recent value per (agent, key), for fast point lookups.
    scratchpad_index: HashMap<(AgentId, String), usize>,
    /// One pending handoff per target agent. Consumed on read.
    handoffs: HashMap<AgentId, HandoffContext>,
}

/// Shared comms surface, handed to every specialist agent alongside the rest
/// of [`crate::AgentDeps`].
pub struct Comms {
    state: Mutex<State>,
}

impl Comms {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Write (or overwrite) a scratchpad entry under `agent_id`/`key`.
    pub fn write_scratchpad(&self, agent_id: AgentId, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let mut state = self.state.lock().expect("comms mutex poisoned");
        let entry = ScratchpadEntry {
            agent_id: agent_id.clone(),
            key: key.clone(),
            value: value.into(),
            timestamp: chrono::Utc::now(),
        };
        state.scratchpad.push(entry);
        let index = state.scratchpad.len() - 1;
        state.scratchpad_index.insert((agent_id, key), index);
    }

    /// Read the most recent value an agent wrote under `key`.
    pub fn read_scratchpad(&self, agent_id: &AgentId, key: &str) -> Result<String> {
        let state = self.state.lock().expect("comms mutex poisoned");
        let idx = state
            .scratchpad_index
            .get(&(agent_id.clone(), key.to_string()))
            .copied()
            .ok_or_else(|| CommsError::NoSuchKey(key.to_string()))?;
        Ok(state.scratchpad[idx].value.clone())
    }

    /// A human-readable summary of the whole scratchpad, most recent first.
    /// Used as the handoff fallback when no explicit handoff is queued.
    pub fn scratchpad_summary(&self) -> Option<String> {
        let state = self.state.lock().expect("comms mutex poisoned");
        if state.scratchpad.is_empty() {
            return None;
        }
        let mut lines: Vec<String> = state
            .scratchpad
            .iter()
            .rev()
            .take(20)
            .map(|e| format!("[{}] {}: {}", e.agent_id, e.key, e.value))
            .collect();
        lines.reverse();
        Some(lines.join("\n"))
    }

    /// Every scratchpad entry in write order. Additive, read-only accessor —
    /// never pops or mutates state.
    pub fn get_conversation_log(&self) -> Vec<ScratchpadEntry> {
        self.state.lock().expect("comms mutex poisoned").scratchpad.clone()
    }

    /// Queue a handoff for `to_agent_id`. Overwrites any handoff already
    /// queued for that agent — handoffs are single-slot, not a FIFO.
    pub fn send_handoff(&self, to_agent_id: AgentId, handoff: HandoffContext) {
        self.state
            .lock()
            .expect("comms mutex poisoned")
            .handoffs
            .insert(to_agent_id, handoff);
    }

    /// Pop the queued handoff for `agent_id`. If none is queued, falls back
    /// to the current scratchpad summary so the receiving agent never starts
    /// from nothing as long as *something* has happened. Only returns `None`
    /// when both the handoff slot and the scratchpad are empty.
    pub fn get_handoff(&self, agent_id: &AgentId) -> Option<HandoffContext> {
        let mut state = self.state.lock().expect("comms mutex poisoned");
        if let Some(handoff) = state.handoffs.remove(agent_id) {
            return Some(handoff);
        }
        drop(state);
        self.scratchpad_summary().map(|summary| HandoffContext {
            from_agent_id: AgentId::from("brain"),
            summary,
            data: serde_json::Value::Null,
        })
    }
}

impl Default for Comms {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_falls_back_to_scratchpad_summary() {
        let comms = Comms::new();
        comms.write_scratchpad(AgentId::from("researcher"), "finding", "found the bug in parser.rs");

        let handoff = comms.get_handoff(&AgentId::from("coder")).expect("fallback handoff");
        assert!(handoff.summary.contains("found the bug"));
    }

    #[test]
    fn explicit_handoff_takes_priority_and_is_consumed_once() {
        let comms = Comms::new();
        comms.write_scratchpad(AgentId::from("researcher"), "finding", "irrelevant noise");
        comms.send_handoff(
            AgentId::from("coder"),
            HandoffContext {
                from_agent_id: AgentId::from("researcher"),
                summary: "fix parser.rs line 42".into(),
                data: serde_json::json!({"file": "parser.rs", "line": 42}),
            },
        );

        let first = comms.get_handoff(&AgentId::from("coder")).unwrap();
        assert_eq!(first.summary, "fix parser.rs line 42");

        // second read has no queued handoff left, falls back to scratchpad
        let second = comms.get_handoff(&AgentId::from("coder")).unwrap();
        assert!(second.summary.contains("irrelevant noise"));
    }

    #[test]
    fn no_handoff_and_no_scratchpad_is_none() {
        let comms = Comms::new();
        assert!(comms.get_handoff(&AgentId::from("coder")).is_none());
    }
}
