//! Top-level error types for Spacebot.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Comms(#[from] CommsError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Heal(#[from] HealError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Database connection and operation errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to SQLite: {0}")]
    SqliteConnect(#[from] sqlx::Error),

    #[error("failed to connect to LanceDB: {0}")]
    LanceConnect(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// LLM provider and model errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("missing API key for provider: {0}")]
    MissingProviderKey(String),

    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("completion failed: {0}")]
    CompletionFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Memory storage and retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory not found: {id}")]
    NotFound { id: String },

    #[error("failed to save memory: {0}")]
    SaveFailed(String),

    #[error("failed to search memories: {0}")]
    SearchFailed(String),

    #[error("failed to generate embedding: {0}")]
    EmbeddingFailed(String),

    #[error("graph operation failed: {0}")]
    GraphOperationFailed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Agent (channel, branch, worker) errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("channel {id} not found")]
    ChannelNotFound { id: String },

    #[error("worker {id} not found")]
    WorkerNotFound { id: String },

    #[error("branch {id} not found")]
    BranchNotFound { id: String },

    #[error("max concurrent branches ({max}) reached for channel {channel_id}")]
    BranchLimitReached { channel_id: String, max: usize },

    #[error("worker state transition failed: {0}")]
    InvalidStateTransition(String),

    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    #[error("process cancelled: {reason}")]
    Cancelled { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Secrets and credential errors.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("failed to encrypt secret: {0}")]
    EncryptionFailed(String),

    #[error("failed to decrypt secret: {0}")]
    DecryptionFailed(String),

    #[error("secret not found: {key}")]
    NotFound { key: String },

    #[error("invalid key format")]
    InvalidKey,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Safety gate refusals. These are never raised out of a tool call; a tool
/// wrapper catches them and returns the `ERROR:`-prefixed tool_result itself.
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("refused: command matched a destructive pattern: {command}")]
    Destructive { command: String },

    #[error("refused: path {path} is outside the configured allow-list")]
    PathNotAllowed { path: String },
}

/// Inter-agent communications (scratchpad / handoff) errors.
#[derive(Debug, thiserror::Error)]
pub enum CommsError {
    #[error("no scratchpad entry for key: {0}")]
    NoSuchKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Tool registry / executor errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },

    #[error("tool {tool} failed: {reason}")]
    HandlerFailed { tool: String, reason: String },

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Message source / sink errors (iMessage poller, dashboard queue, outbound send).
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("failed to open message database: {0}")]
    DbOpenFailed(String),

    #[error("sqlite3 CLI fallback failed: {0}")]
    CliFallbackFailed(String),

    #[error("failed to send outbound message after {attempts} attempts: {reason}")]
    SendFailed { attempts: u32, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Parallel Task Dispatcher errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Self-Heal engine errors.
#[derive(Debug, thiserror::Error)]
pub enum HealError {
    #[error("heal proposal rejected by owner")]
    Rejected,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
