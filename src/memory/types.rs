//! Flat-file memory data model: a small set of markdown categories plus a
//! JSONL action log, not a database. See [`super::store::MemoryStore`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The categories a memory entry can belong to. Each maps to a markdown
/// file (or, for `Project`, a directory of files) under the memory root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Context,
    Preference,
    Project,
    Credential,
    Learned,
    /// Notes touch no file; they only ever appear in the action log.
    Note,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "context" => Some(Category::Context),
            "preference" | "preferences" => Some(Category::Preference),
            "project" | "projects" => Some(Category::Project),
            "credential" | "credentials" => Some(Category::Credential),
            "learned" => Some(Category::Learned),
            "note" | "notes" => Some(Category::Note),
            _ => None,
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Context,
            Category::Preference,
            Category::Project,
            Category::Credential,
            Category::Learned,
            Category::Note,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Context => "context",
            Category::Preference => "preference",
            Category::Project => "project",
            Category::Credential => "credential",
            Category::Learned => "learned",
            Category::Note => "note",
        };
        write!(f, "{}", s)
    }
}

/// A single key/value memory entry as returned by `list_all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub category: Category,
    pub key: String,
    pub value: String,
}

/// A single recall hit, annotated with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResult {
    pub source: String,
    pub preview: String,
}

/// One line of the JSONL action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tool_name: String,
    pub args_preview: String,
    pub result_preview: String,
}

/// Outcome of a `delete` call, reported back to the tool caller.
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    WipedAll { entries_removed: usize },
    RemovedKey { category: Category, key: String },
    NothingMatched,
    UnknownCategory { valid: Vec<Category> },
}
