//! Routes a completion request to the right model/client pair for the
//! caller's tier, so the Brain and every specialist share one type instead
//! of each constructing its own [`super::LlmClient`].
//!
//! Brain and agent tiers may use different providers, models, or API keys
//! (`BrainConfig` vs `AgentLlmConfig`); a specialist can also ask for a
//! specific model override (e.g. a cheaper model for a simple task) without
//! needing its own client.

use super::{ChatMessage, CompletionTurn, LlmClient, ToolDefinition};
use crate::config::Config;
use crate::error::{LlmError, Result};

/// Which configured model tier a completion call should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmTier {
    Brain,
    Agent,
}

/// Strips a `provider/model` prefix down to the bare model id the wire
/// protocol expects (the config stores the qualified form so a future
/// multi-provider build can branch on the prefix; only Anthropic is wired
/// up today).
fn bare_model(model: &str) -> &str {
    model.split_once('/').map(|(_, m)| m).unwrap_or(model)
}

/// Holds one [`LlmClient`] per tier plus its configured model id. Built once
/// at startup from [`Config`]; callers never reload this, since the brain
/// and agent api keys are validated at startup, not hot-reloaded.
pub struct LlmManager {
    brain_client: LlmClient,
    brain_model: String,
    agent_client: LlmClient,
    agent_model: String,
}

impl LlmManager {
    /// Builds clients for both tiers. A tier missing its own API key falls
    /// back to the other tier's key (mirroring `Config::validate`'s
    /// "at least one of the two" requirement) so installs with a single
    /// shared key still work.
    pub fn new(config: &Config) -> Result<Self> {
        let brain_key = config
            .brain
            .api_key
            .clone()
            .or_else(|| config.agent_llm.api_key.clone())
            .ok_or_else(|| LlmError::MissingProviderKey("brain".into()))?;
        let agent_key = config
            .agent_llm
            .api_key
            .clone()
            .or_else(|| config.brain.api_key.clone())
            .ok_or_else(|| LlmError::MissingProviderKey("agent".into()))?;

        Ok(Self {
            brain_client: LlmClient::new(brain_key),
            brain_model: config.brain.model.clone(),
            agent_client: LlmClient::new(agent_key),
            agent_model: config.agent_llm.model.clone(),
        })
    }

    /// Runs one completion turn against the given tier's client/model,
    /// optionally overriding the model id (a specialist may want a
    /// cheaper/faster model than its tier default for a given task).
    pub async fn complete(
        &self,
        tier: LlmTier,
        model_override: Option<&str>,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionTurn> {
        let (client, default_model) = match tier {
            LlmTier::Brain => (&self.brain_client, self.brain_model.as_str()),
            LlmTier::Agent => (&self.agent_client, self.agent_model.as_str()),
        };
        let model = bare_model(model_override.unwrap_or(default_model));
        client.complete(model, system, messages, tools, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_keys() -> Config {
        let mut config = Config::default();
        config.brain.api_key = Some("brain-key".into());
        config.agent_llm.api_key = Some("agent-key".into());
        config
    }

    #[test]
    fn builds_from_config_with_both_keys() {
        let manager = LlmManager::new(&config_with_keys());
        assert!(manager.is_ok());
    }

    #[test]
    fn falls_back_to_the_other_tiers_key_when_one_is_missing() {
        let mut config = config_with_keys();
        config.agent_llm.api_key = None;
        let manager = LlmManager::new(&config);
        assert!(manager.is_ok());
    }

    #[test]
    fn bare_model_strips_provider_prefix() {
        assert_eq!(bare_model("anthropic/claude-sonnet-4-20250514"), "claude-sonnet-4-20250514");
        assert_eq!(bare_model("claude-sonnet-4-20250514"), "claude-sonnet-4-20250514");
    }
}
