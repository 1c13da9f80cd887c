//! Configuration loading, validation, and hot reload.
//!
//! Static settings (paths, log level) are read once at startup. Values that
//! benefit from being changed without a restart — model routing, the safety
//! allow-list, kill words — live behind an `ArcSwap` snapshot that a file
//! watcher refreshes when the on-disk TOML changes.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level configuration, loaded once at startup from TOML plus env overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub brain: BrainConfig,
    pub agent_llm: AgentLlmConfig,
    pub messaging: MessagingConfig,
    pub safety: SafetyConfig,
    pub runtime: AgentRuntimeConfig,
    pub memory: MemoryConfig,
    pub relay: RelayConfig,
    pub imessage: ImessageConfig,
    pub coalesce: CoalesceConfig,
    pub done_guard: DoneGuardConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            brain: BrainConfig::default(),
            agent_llm: AgentLlmConfig::default(),
            messaging: MessagingConfig::default(),
            safety: SafetyConfig::default(),
            runtime: AgentRuntimeConfig::default(),
            memory: MemoryConfig::default(),
            relay: RelayConfig::default(),
            imessage: ImessageConfig::default(),
            coalesce: CoalesceConfig::default(),
            done_guard: DoneGuardConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Brain (orchestrator) LLM configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrainConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub max_history_turns: usize,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-20250514".into(),
            api_key: std::env::var("SPACEBOT_BRAIN_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            max_history_turns: 40,
        }
    }
}

/// Per-specialist-agent LLM defaults. Individual agents may override `model`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentLlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub max_steps: u32,
}

impl Default for AgentLlmConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-20250514".into(),
            api_key: std::env::var("SPACEBOT_AGENT_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            max_steps: 40,
        }
    }
}

/// Messaging source configuration: who we talk to and how often we poll.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// iMessage handle (phone number or email) of the owner. Only messages
    /// from this address are treated as commands.
    pub owner_address: String,
    pub poll_interval_ms: u64,
    pub rate_limit_per_minute: u32,
    pub max_message_length: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            owner_address: String::new(),
            poll_interval_ms: 2_000,
            rate_limit_per_minute: 20,
            max_message_length: 4_000,
        }
    }
}

/// Safety gate policy: destructive-command refusal and path allow-listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Phrases that, when seen in an inbound message, kill the current task.
    pub kill_words: Vec<String>,
    /// Allow-listed path prefixes for filesystem tools. Empty means allow all
    /// (fail-open; this gate is advisory, not a sandbox boundary).
    pub allowed_paths: Vec<PathBuf>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            kill_words: vec!["stop".into(), "cancel".into(), "kill it".into()],
            allowed_paths: Vec::new(),
        }
    }
}

/// Process-wide runtime behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentRuntimeConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub max_parallel_tasks: usize,
    pub max_restart_attempts: u32,
    pub restart_delay_secs: u64,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
            max_parallel_tasks: 4,
            max_restart_attempts: 10,
            restart_delay_secs: 5,
        }
    }
}

/// Memory store file layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub context_file: String,
    pub preferences_file: String,
    pub credentials_file: String,
    pub learned_file: String,
    pub projects_dir: String,
    pub history_file: String,
    pub max_history_context: usize,
    pub max_file_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_file: "context.md".into(),
            preferences_file: "preferences.md".into(),
            credentials_file: "credentials.md".into(),
            learned_file: "learned.md".into(),
            projects_dir: "projects".into(),
            history_file: "actions.jsonl".into(),
            max_history_context: 10,
            max_file_bytes: 50 * 1024,
        }
    }
}

/// Outbound relay used by the Process Supervisor & Tunnel to mirror events
/// to an external dashboard, if configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
        }
    }
}

/// iMessage-specific knobs: the dispatcher's progress-collector cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImessageConfig {
    /// Path to the Messages SQLite database. Defaults to the standard
    /// macOS location; overridable for tests and non-default installs.
    pub db_path: PathBuf,
    pub progress_interval_secs: u64,
    pub heartbeat_silence_secs: u64,
    pub dedup_capacity: usize,
}

impl Default for ImessageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::home_dir()
                .map(|h| h.join("Library/Messages/chat.db"))
                .unwrap_or_else(|| PathBuf::from("chat.db")),
            progress_interval_secs: 30,
            heartbeat_silence_secs: 45,
            dedup_capacity: 1_000,
        }
    }
}

/// Merge-window tuning for the Message Stream Parser's debounce buffer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct CoalesceConfig {
    pub window_ms: u64,
    pub max_wait_ms: u64,
    pub min_messages_for_window: usize,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            window_ms: 3_000,
            max_wait_ms: 8_000,
            min_messages_for_window: 1,
        }
    }
}

/// Agent Loop `done` rejection policy. See the loop's `validate_done` for how
/// these combine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DoneGuardConfig {
    pub min_actions: u32,
    pub max_error_ratio: f32,
    pub success_signals: Vec<String>,
    pub failure_signals: Vec<String>,
}

impl Default for DoneGuardConfig {
    fn default() -> Self {
        Self {
            min_actions: 4,
            max_error_ratio: 0.5,
            success_signals: Vec::new(),
            failure_signals: Vec::new(),
        }
    }
}

/// Tracing / OpenTelemetry export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub otlp_headers: std::collections::HashMap<String, String>,
    pub service_name: String,
    pub sample_rate: f64,
    #[serde(default)]
    pub metrics_enabled: bool,
    pub metrics_addr: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            otlp_headers: std::collections::HashMap::new(),
            service_name: "spacebot".into(),
            sample_rate: 1.0,
            metrics_enabled: false,
            metrics_addr: None,
        }
    }
}

impl Config {
    fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("spacebot"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// Directory holding the pid file, socket, and logs for a running instance.
    pub fn default_instance_dir() -> PathBuf {
        Self::default_data_dir()
    }

    /// True if no config file exists yet at the default path — used by the
    /// CLI to decide whether to run the first-run wizard.
    pub fn needs_onboarding() -> bool {
        !Self::default_config_path().exists()
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Load configuration from the default path, falling back to defaults
    /// plus environment overrides if no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::default_config_path();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Self::load_from_env(&Self::default_data_dir())
        }
    }

    /// Load from a specific TOML file, then apply env var overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
            .map_err(|e| ConfigError::Load {
                path: path.display().to_string(),
                source: Arc::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
            })?;
        let mut config: Config = toml::from_str(&text)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration purely from environment variables plus defaults,
    /// rooted at `instance_dir`.
    pub fn load_from_env(instance_dir: &Path) -> Result<Self> {
        let mut config = Config {
            data_dir: instance_dir.to_path_buf(),
            ..Config::default()
        };
        config.apply_env_overrides();
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create data directory: {}", config.data_dir.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SPACEBOT_BRAIN_API_KEY") {
            self.brain.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("SPACEBOT_AGENT_API_KEY") {
            self.agent_llm.api_key = Some(key);
        }
        if let Ok(owner) = std::env::var("SPACEBOT_OWNER_ADDRESS") {
            self.messaging.owner_address = owner;
        }
        if let Ok(endpoint) = std::env::var("SPACEBOT_OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(endpoint);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.brain.api_key.is_none() && self.agent_llm.api_key.is_none() {
            return Err(ConfigError::Invalid(
                "no LLM provider API key configured; set SPACEBOT_BRAIN_API_KEY or ANTHROPIC_API_KEY".into(),
            )
            .into());
        }
        Ok(())
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("spacebot.db")
    }

    pub fn lancedb_path(&self) -> PathBuf {
        self.data_dir.join("lancedb")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.data_dir.join("memory")
    }
}

/// A hot-reloadable snapshot of the parts of [`Config`] that can change
/// without a restart, refreshed by a debounced file watcher on the config
/// path. Everything else in [`Config`] is read once at startup.
pub struct RuntimeConfig {
    pub safety: ArcSwap<SafetyConfig>,
    pub messaging: ArcSwap<MessagingConfig>,
    pub coalesce: ArcSwap<CoalesceConfig>,
    pub done_guard: ArcSwap<DoneGuardConfig>,
    config_path: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn new(config: &Config) -> Self {
        Self {
            safety: ArcSwap::from_pointee(config.safety.clone()),
            messaging: ArcSwap::from_pointee(config.messaging.clone()),
            coalesce: ArcSwap::from_pointee(config.coalesce.clone()),
            done_guard: ArcSwap::from_pointee(config.done_guard.clone()),
            config_path: None,
        }
    }

    pub fn with_watched_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Re-read the backing TOML file and swap in the parts that are allowed
    /// to change live. Called by the `notify` file-watch task on debounced
    /// write events.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        let fresh = Config::load_from_path(path)?;
        self.safety.store(Arc::new(fresh.safety));
        self.messaging.store(Arc::new(fresh.messaging));
        self.coalesce.store(Arc::new(fresh.coalesce));
        self.done_guard.store(Arc::new(fresh.done_guard));
        tracing::info!(path = %path.display(), "runtime config reloaded");
        Ok(())
    }

    /// Spawn a debounced file watcher that calls [`RuntimeConfig::reload`]
    /// whenever the config file changes on disk.
    pub fn watch(self: &Arc<Self>) -> Result<Option<notify::RecommendedWatcher>> {
        use notify::Watcher as _;

        let Some(path) = self.config_path.clone() else {
            return Ok(None);
        };
        let this = Arc::clone(self);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event.kind.is_modify() {
                    if let Err(err) = this.reload() {
                        tracing::warn!(%err, "failed to reload runtime config");
                    }
                }
            }
        })
        .context("failed to create config file watcher")?;
        watcher
            .watch(&path, notify::RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch config file: {}", path.display()))?;
        Ok(Some(watcher))
    }
}
