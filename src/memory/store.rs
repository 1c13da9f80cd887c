//! Flat-file Memory Store: one markdown file per category (`context`,
//! `preference`, `credential`, `learned`), a directory of per-project files,
//! and an append-only JSONL action log. No database — every write is a
//! read-modify-write of a small text file guarded by a lock, which is all
//! this needs: single-digit KB files, upserts measured in dozens of lines.
//!
//! `recall` is keyword-only by default (tokenized match against stored
//! lines) and optionally layered with a semantic pass through
//! [`super::lance::EmbeddingTable`] when one is configured — see
//! [`MemoryStore::with_semantic_index`].

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::memory::lance::EmbeddingTable;
use crate::memory::types::{ActionLogEntry, Category, DeleteOutcome, MemoryEntry, RecallResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static BULLET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^- \*\*(.+?)\*\*: (.*)$").expect("valid regex"));

/// The durable key/value store plus action log described in the design: an
/// upsert-by-key markdown file per category, size-capped with oldest-entry
/// eviction, and a rotating JSONL action log.
pub struct MemoryStore {
    root: PathBuf,
    config: MemoryConfig,
    /// Serializes every category-file read-modify-write. A single lock
    /// covering all categories is stronger than the design requires (it only
    /// asks for per-file locking) but the files are tiny and writes are rare
    /// enough that the extra serialization costs nothing.
    files_lock: Mutex<()>,
    action_log_lock: Mutex<()>,
    semantic_index: EmbeddingTable,
}

impl MemoryStore {
    /// Open (creating if absent) a memory store rooted at `root`.
    pub async fn new(root: PathBuf, config: MemoryConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            MemoryError::SaveFailed(format!("failed to create memory dir {}: {e}", root.display()))
        })?;
        tokio::fs::create_dir_all(root.join(&config.projects_dir))
            .await
            .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
        Ok(Self {
            root,
            config,
            files_lock: Mutex::new(()),
            action_log_lock: Mutex::new(()),
            semantic_index: EmbeddingTable::disabled(),
        })
    }

    /// Attach a semantic index. Every subsequent `save` additionally upserts
    /// an embedding row; every `recall` appends a "Semantic matches" section.
    pub fn with_semantic_index(mut self, index: EmbeddingTable) -> Self {
        self.semantic_index = index;
        self
    }

    fn file_path(&self, category: Category) -> PathBuf {
        match category {
            Category::Context => self.root.join(&self.config.context_file),
            Category::Preference => self.root.join(&self.config.preferences_file),
            Category::Credential => self.root.join(&self.config.credentials_file),
            Category::Learned => self.root.join(&self.config.learned_file),
            Category::Note => self.root.join("notes.md"),
            Category::Project => unreachable!("projects use project_file, not file_path"),
        }
    }

    /// Every `projects/*.md` file's entries, read with the same bullet-entry
    /// parser as any other category (each project file holds exactly one
    /// `- **key**: value` entry, written by `save`). Missing/unreadable
    /// directory degrades to empty rather than erroring — `recall` must
    /// never fail just because no project has been saved yet.
    async fn project_entries(&self) -> Vec<(String, String)> {
        let dir = self.root.join(&self.config.projects_dir);
        let Ok(mut read_dir) = tokio::fs::read_dir(&dir).await else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Ok((_, entries)) = read_category_file(&path, Self::header_for(Category::Project)).await {
                out.extend(entries);
            }
        }
        out.sort();
        out
    }

    fn project_file(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(&self.config.projects_dir).join(format!("{safe}.md"))
    }

    fn header_for(category: Category) -> &'static str {
        match category {
            Category::Context => "# Context\n",
            Category::Preference => "# Preferences\n",
            Category::Credential => "# Credentials\n",
            Category::Learned => "# Learned\n",
            Category::Note => "# Notes\n",
            Category::Project => "# Project\n",
        }
    }

    /// Upsert `(category, key) -> value`. Matches an existing `- **key**:
    /// ...` line and rewrites it in place; otherwise appends. After the
    /// write, oldest entries are trimmed (in file order, after the header)
    /// until the file is back under `max_file_bytes`.
    pub async fn save(&self, category: Category, key: &str, value: &str) -> Result<()> {
        let _guard = self.files_lock.lock().await;
        let path = if category == Category::Project {
            self.project_file(key)
        } else {
            self.file_path(category)
        };

        let (header, mut entries) = read_category_file(&path, Self::header_for(category)).await?;
        upsert_entry(&mut entries, key, value);
        trim_to_cap(&mut entries, self.config.max_file_bytes, header.len() as u64);
        write_category_file(&path, &header, &entries).await?;

        if self.semantic_index.is_enabled() {
            let id = content_hash(&format!("{category}:{key}"));
            if let Ok(embedding) = crate::memory::embedding::embed_text(value).await {
                let _ = self
                    .semantic_index
                    .upsert(&id, &category.to_string(), key, value, &embedding)
                    .await;
            }
        }
        Ok(())
    }

    /// Keyword search across context, preferences, every project file,
    /// credentials, learned, then the last 10 action-log entries — in that
    /// order — plus an optional semantic pass. A stored line matches if the
    /// whole query appears as a substring, or at least half of the query's
    /// whitespace tokens appear in the line. Capped at 10 matches total.
    pub async fn recall(&self, query: &str) -> Result<String> {
        const MAX_HITS: usize = 10;
        const ENTRY_PREVIEW: usize = 500;
        const HISTORY_PREVIEW: usize = 200;

        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let needed = (tokens.len() / 2).max(1);
        let query_lower = query.to_lowercase();
        let matches = |line_lower: &str| -> bool {
            line_lower.contains(&query_lower) || tokens.iter().filter(|t| line_lower.contains(t.as_str())).count() >= needed
        };

        let mut hits: Vec<RecallResult> = Vec::new();
        let _guard = self.files_lock.lock().await;

        for &category in &[Category::Context, Category::Preference] {
            let path = self.file_path(category);
            let (_, entries) = read_category_file(&path, Self::header_for(category)).await?;
            for (k, v) in &entries {
                if matches(&format!("{k} {v}").to_lowercase()) {
                    hits.push(RecallResult {
                        source: format!("{category}/{k}"),
                        preview: format!("**{k}**: {}", truncate(v, ENTRY_PREVIEW)),
                    });
                }
            }
        }

        for (key, value) in self.project_entries().await {
            if matches(&format!("{key} {value}").to_lowercase()) {
                hits.push(RecallResult {
                    source: format!("project/{key}"),
                    preview: format!("**{key}**: {}", truncate(&value, ENTRY_PREVIEW)),
                });
            }
        }

        for &category in &[Category::Credential, Category::Learned] {
            let path = self.file_path(category);
            let (_, entries) = read_category_file(&path, Self::header_for(category)).await?;
            for (k, v) in &entries {
                if matches(&format!("{k} {v}").to_lowercase()) {
                    hits.push(RecallResult {
                        source: format!("{category}/{k}"),
                        preview: format!("**{k}**: {}", truncate(v, ENTRY_PREVIEW)),
                    });
                }
            }
        }
        drop(_guard);

        for record in self.recent_actions(10).await {
            let line_lower = format!("{} {}", record.entry.tool_name, record.entry.result_preview).to_lowercase();
            if matches(&line_lower) {
                hits.push(RecallResult {
                    source: format!("history/{}", record.entry.tool_name),
                    preview: truncate(&record.entry.result_preview, HISTORY_PREVIEW),
                });
            }
        }

        hits.truncate(MAX_HITS);

        if hits.is_empty() {
            return Ok(format!("No memory found matching \"{query}\"."));
        }

        let mut out = String::from("## Recall results\n\n");
        for hit in &hits {
            out.push_str(&format!("- [{}] {}\n", hit.source, hit.preview));
        }

        if self.semantic_index.is_enabled() {
            if let Ok(embedding) = crate::memory::embedding::embed_text(query).await {
                let semantic = self.semantic_index.search(&embedding, 5).await.unwrap_or_default();
                if !semantic.is_empty() {
                    out.push_str("\n## Semantic matches\n\n");
                    for m in semantic {
                        out.push_str(&format!("- [{}/{}] {} (score {:.2})\n", m.category, m.key, m.text, m.score));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Structured listing, optionally scoped to one category.
    pub async fn list_all(&self, category: Option<Category>) -> Result<Vec<MemoryEntry>> {
        let _guard = self.files_lock.lock().await;
        let categories: Vec<Category> = match category {
            Some(c) => vec![c],
            None => Category::all().iter().copied().filter(|c| *c != Category::Project).collect(),
        };
        let mut out = Vec::new();
        for category in categories {
            let path = self.file_path(category);
            let (_, entries) = read_category_file(&path, Self::header_for(category)).await?;
            for (key, value) in entries {
                out.push(MemoryEntry { category, key, value });
            }
        }
        Ok(out)
    }

    /// Targeted delete of one key, or a whole category wipe when `key` is
    /// `None`. `delete_all` wipes every category file plus the action log.
    pub async fn delete(&self, category: Category, key: Option<&str>) -> Result<DeleteOutcome> {
        let _guard = self.files_lock.lock().await;
        let path = self.file_path(category);
        let (header, mut entries) = read_category_file(&path, Self::header_for(category)).await?;

        match key {
            Some(key) => {
                let before = entries.len();
                entries.retain(|(k, _)| k != key);
                if entries.len() == before {
                    return Ok(DeleteOutcome::NothingMatched);
                }
                write_category_file(&path, &header, &entries).await?;
                if self.semantic_index.is_enabled() {
                    let id = content_hash(&format!("{category}:{key}"));
                    let _ = self.semantic_index.delete(&id).await;
                }
                Ok(DeleteOutcome::RemovedKey { category, key: key.to_string() })
            }
            None => {
                let removed = entries.len();
                write_category_file(&path, &header, &[]).await?;
                Ok(DeleteOutcome::WipedAll { entries_removed: removed })
            }
        }
    }

    /// Wipe every category file and the action log. Only reachable via the
    /// `delete` tool's `category = "all"` sentinel.
    pub async fn delete_all(&self) -> Result<DeleteOutcome> {
        let _guard = self.files_lock.lock().await;
        let mut removed = 0usize;
        for &category in Category::all().iter().filter(|c| **c != Category::Project) {
            let path = self.file_path(category);
            let (header, entries) = read_category_file(&path, Self::header_for(category)).await?;
            removed += entries.len();
            write_category_file(&path, &header, &[]).await?;
        }
        drop(_guard);
        let log_guard = self.action_log_lock.lock().await;
        let _ = tokio::fs::remove_file(self.action_log_path()).await;
        drop(log_guard);
        Ok(DeleteOutcome::WipedAll { entries_removed: removed })
    }

    fn action_log_path(&self) -> PathBuf {
        self.root.join(&self.config.history_file)
    }

    /// Append one JSONL record. Failures here are swallowed — action log
    /// writes must never interrupt an agent's tool loop.
    pub async fn log_action(&self, action: &str, input: &str, result: &str, success: bool) {
        if let Err(err) = self.try_log_action(action, input, result, success).await {
            tracing::warn!(%err, action, "failed to append action log entry");
        }
    }

    async fn try_log_action(&self, action: &str, input: &str, result: &str, success: bool) -> Result<()> {
        const MAX_PREVIEW: usize = 500;
        const ROTATE_BYTES: u64 = 10 * 1024 * 1024;

        let entry = ActionLogEntry {
            timestamp: chrono::Utc::now(),
            tool_name: action.to_string(),
            args_preview: truncate(input, MAX_PREVIEW),
            result_preview: truncate(result, MAX_PREVIEW),
        };
        let mut line = serde_json::to_string(&ActionLogRecord { entry, success })
            .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
        line.push('\n');

        let _guard = self.action_log_lock.lock().await;
        let path = self.action_log_path();

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() >= ROTATE_BYTES {
                let ts = chrono::Utc::now().timestamp();
                let backup = path.with_extension(format!("{ts}.bak"));
                tokio::fs::rename(&path, &backup).await.ok();
            }
        }

        use tokio::io::AsyncWriteExt as _;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
        Ok(())
    }

    /// Multi-section summary injected into the Brain's system prompt: the
    /// current context, preferences, and the last `max_history_context`
    /// action log entries. Read failures degrade to an empty section rather
    /// than propagating — a missing file must never break prompt assembly.
    pub async fn get_context_summary(&self) -> String {
        let mut out = String::new();

        if let Ok(text) = self.render_category_section("Current Context", Category::Context).await {
            out.push_str(&text);
        }
        if let Ok(text) = self.render_category_section("Preferences", Category::Preference).await {
            out.push_str(&text);
        }

        let recent = self.recent_actions(self.config.max_history_context).await;
        if !recent.is_empty() {
            out.push_str("## Recent Actions\n\n");
            for record in recent {
                let marker = if record.success { "ok" } else { "FAILED" };
                out.push_str(&format!(
                    "- [{}] {} ({}): {}\n",
                    record.entry.timestamp.format("%Y-%m-%d %H:%M"),
                    record.entry.tool_name,
                    marker,
                    record.entry.result_preview
                ));
            }
        }
        out
    }

    async fn render_category_section(&self, title: &str, category: Category) -> Result<String> {
        let _guard = self.files_lock.lock().await;
        let path = self.file_path(category);
        let (_, entries) = read_category_file(&path, Self::header_for(category)).await?;
        if entries.is_empty() {
            return Ok(String::new());
        }
        let mut out = format!("## {title}\n\n");
        for (k, v) in entries {
            out.push_str(&format!("- **{k}**: {v}\n"));
        }
        out.push('\n');
        Ok(out)
    }

    async fn recent_actions(&self, limit: usize) -> Vec<ActionLogRecord> {
        let _guard = self.action_log_lock.lock().await;
        let Ok(text) = tokio::fs::read_to_string(self.action_log_path()).await else {
            return Vec::new();
        };
        let mut records: Vec<ActionLogRecord> = text
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let start = records.len().saturating_sub(limit);
        records.split_off(start)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ActionLogRecord {
    #[serde(flatten)]
    entry: ActionLogEntry,
    success: bool,
}

async fn read_category_file(path: &Path, default_header: &str) -> Result<(String, Vec<(String, String)>)> {
    let Ok(text) = tokio::fs::read_to_string(path).await else {
        return Ok((default_header.to_string(), Vec::new()));
    };
    let mut header_lines = Vec::new();
    let mut entries = Vec::new();
    let mut in_body = false;
    for line in text.lines() {
        if let Some(caps) = BULLET_LINE.captures(line) {
            in_body = true;
            entries.push((caps[1].to_string(), caps[2].to_string()));
        } else if !in_body {
            header_lines.push(line.to_string());
        }
    }
    let header = if header_lines.is_empty() {
        default_header.to_string()
    } else {
        format!("{}\n", header_lines.join("\n"))
    };
    Ok((header, entries))
}

async fn write_category_file(path: &Path, header: &str, entries: &[(String, String)]) -> Result<()> {
    let mut body = header.trim_end_matches('\n').to_string();
    body.push('\n');
    if !entries.is_empty() {
        body.push('\n');
        for (k, v) in entries {
            body.push_str(&format!("- **{k}**: {v}\n"));
        }
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, body.as_bytes())
        .await
        .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| MemoryError::SaveFailed(e.to_string()))?;
    Ok(())
}

fn upsert_entry(entries: &mut Vec<(String, String)>, key: &str, value: &str) {
    if let Some(existing) = entries.iter_mut().find(|(k, _)| k == key) {
        existing.1 = value.to_string();
    } else {
        entries.push((key.to_string(), value.to_string()));
    }
}

/// Drop oldest entries (front of the list, i.e. first-written / least
/// recently upserted) until the serialized file would fit under `cap`.
fn trim_to_cap(entries: &mut Vec<(String, String)>, cap: u64, header_bytes: u64) {
    if cap == 0 {
        return;
    }
    let entry_bytes = |k: &str, v: &str| (k.len() + v.len() + 8) as u64;
    let mut total: u64 = header_bytes + entries.iter().map(|(k, v)| entry_bytes(k, v)).sum::<u64>();
    while total > cap && !entries.is_empty() {
        let (k, v) = entries.remove(0);
        total -= entry_bytes(&k, &v);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

fn content_hash(s: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(&digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> MemoryStore {
        let dir = tempfile::tempdir().unwrap();
        MemoryStore::new(dir.path().to_path_buf(), MemoryConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_existing_key() {
        let store = store().await;
        store.save(Category::Preference, "timezone", "UTC").await.unwrap();
        store.save(Category::Preference, "timezone", "America/New_York").await.unwrap();

        let entries = store.list_all(Some(Category::Preference)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "America/New_York");
    }

    #[tokio::test]
    async fn recall_finds_saved_value_as_substring() {
        let store = store().await;
        store.save(Category::Context, "project", "building a rust orchestration engine").await.unwrap();
        let result = store.recall("rust orchestration").await.unwrap();
        assert!(result.contains("building a rust orchestration engine"));
    }

    #[tokio::test]
    async fn recall_finds_project_file_content() {
        let store = store().await;
        store.save(Category::Project, "spacebot", "multi-agent orchestration engine rewrite").await.unwrap();
        let result = store.recall("orchestration engine").await.unwrap();
        assert!(result.contains("multi-agent orchestration engine rewrite"));
        assert!(result.contains("project/spacebot"));
    }

    #[tokio::test]
    async fn recall_finds_recent_action_log_entry() {
        let store = store().await;
        store.log_action("run_quick_command", "df -h", "disk usage nominal, 40G free", true).await;
        let result = store.recall("disk usage").await.unwrap();
        assert!(result.contains("disk usage nominal"));
        assert!(result.contains("history/run_quick_command"));
    }

    #[tokio::test]
    async fn delete_key_removes_only_that_entry() {
        let store = store().await;
        store.save(Category::Learned, "a", "1").await.unwrap();
        store.save(Category::Learned, "b", "2").await.unwrap();
        let outcome = store.delete(Category::Learned, Some("a")).await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::RemovedKey { .. }));

        let remaining = store.list_all(Some(Category::Learned)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "b");
    }

    #[tokio::test]
    async fn action_log_appends_and_feeds_context_summary() {
        let store = store().await;
        store.log_action("run_quick_command", "df -h", "output: 40G free", true).await;
        let summary = store.get_context_summary().await;
        assert!(summary.contains("run_quick_command"));
    }

    #[tokio::test]
    async fn category_cap_trims_oldest_entries() {
        let mut config = MemoryConfig::default();
        config.max_file_bytes = 80;
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().to_path_buf(), config).await.unwrap();

        for i in 0..10 {
            store.save(Category::Learned, &format!("k{i}"), "some reasonably long value here").await.unwrap();
        }
        let entries = store.list_all(Some(Category::Learned)).await.unwrap();
        assert!(entries.len() < 10, "expected oldest entries to be trimmed");
        assert_eq!(entries.last().unwrap().key, "k9");
    }
}
