//! Message Stream Parser (§4.7): batches back-to-back human messages into
//! semantically coherent units before they reach the Brain.
//!
//! A window buffer collects messages since `window_start`; each ingest
//! resets a debounce timer (`coalesce.window_ms`). When the timer fires with
//! no further ingests, the window is classified and emitted as a [`Batch`].
//! A second, non-resetting cap (`coalesce.max_wait_ms`) forces an emit even
//! under a steady drip of messages, so one chatty sender can't starve the
//! Brain of any response.

use crate::config::RuntimeConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;

/// How a batch's combined text should be treated by the Brain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    Single,
    Correction,
    Addition,
    MultiTask,
}

/// A coalesced unit of inbound text, ready for the Brain or the Dispatcher.
#[derive(Debug, Clone)]
pub struct Batch {
    pub source: String,
    pub merged_text: String,
    pub batch_type: BatchType,
    /// Populated only for `MultiTask`: the ordered, individually-imperative
    /// pieces the Dispatcher will fan out as separate tasks.
    pub individual_tasks: Vec<String>,
}

const CORRECTION_MARKERS: &[&str] = &["actually", "wait", "no,", "i meant", "scratch that"];
const ADDITIVE_MARKERS: &[&str] = &["also", "and ", "plus", "oh and"];
const STRONG_CONNECTIVES: &[&str] = &["then", "after that"];

struct WindowState {
    source: String,
    texts: Vec<String>,
    window_start: Instant,
    generation: u64,
}

/// Buffers inbound text per logical source until a merge window closes.
pub struct StreamParser {
    runtime_config: Arc<RuntimeConfig>,
    state: Mutex<Option<WindowState>>,
    generation_counter: AtomicU64,
    tx: mpsc::Sender<Batch>,
}

impl StreamParser {
    pub fn new(runtime_config: Arc<RuntimeConfig>) -> (Arc<Self>, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Arc::new(Self {
                runtime_config,
                state: Mutex::new(None),
                generation_counter: AtomicU64::new(0),
                tx,
            }),
            rx,
        )
    }

    /// Appends `text` to the window for `source`, (re)starting the debounce
    /// timer. If the window has already run past `max_wait_ms`, flushes
    /// immediately instead of extending it further.
    pub fn ingest(self: &Arc<Self>, source: impl Into<String>, text: impl Into<String>) {
        let coalesce = self.runtime_config.coalesce.load();
        let source = source.into();
        let text = text.into();

        let past_max_wait = {
            let mut guard = self.state.lock().expect("stream parser state mutex poisoned");
            match guard.as_mut() {
                Some(state) if state.source == source => {
                    state.texts.push(text);
                    state.window_start.elapsed().as_millis() as u64 >= coalesce.max_wait_ms
                }
                _ => {
                    *guard = Some(WindowState {
                        source,
                        texts: vec![text],
                        window_start: Instant::now(),
                        generation: self.generation_counter.fetch_add(1, Ordering::SeqCst),
                    });
                    false
                }
            }
        };

        if past_max_wait {
            self.flush();
            return;
        }

        let generation = self.generation_counter.fetch_add(1, Ordering::SeqCst);
        if let Some(state) = self.state.lock().expect("stream parser state mutex poisoned").as_mut() {
            state.generation = generation;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(this.runtime_config.coalesce.load().window_ms)).await;
            this.fire_if_current(generation);
        });
    }

    fn fire_if_current(&self, generation: u64) {
        let mut guard = self.state.lock().expect("stream parser state mutex poisoned");
        if matches!(guard.as_ref(), Some(s) if s.generation == generation) {
            let state = guard.take().expect("checked Some above");
            drop(guard);
            self.emit(state);
        }
    }

    /// Synchronously empties the buffer even before the timer fires (used on
    /// shutdown, and internally when `max_wait_ms` is exceeded).
    pub fn flush(&self) {
        let state = self.state.lock().expect("stream parser state mutex poisoned").take();
        if let Some(state) = state {
            self.emit(state);
        }
    }

    fn emit(&self, state: WindowState) {
        let batch = classify(state.source, state.texts);
        // A full channel here means the consumer has fallen far behind;
        // drop rather than block the caller (ingest is called from the
        // multiplexer's hot poll path).
        let _ = self.tx.try_send(batch);
    }
}

fn classify(source: String, texts: Vec<String>) -> Batch {
    let joined = texts.join("\n");
    let latest = texts.last().cloned().unwrap_or_default();
    let latest_lower = latest.trim().to_lowercase();

    if CORRECTION_MARKERS.iter().any(|m| latest_lower.starts_with(m)) {
        // A correction overrides the prior plan, but `merged_text` still has
        // to carry every buffered message's text (P6) — the override is
        // expressed by putting the correction last and labeling it, not by
        // dropping what came before. The Brain's correction hint (built from
        // `batch_type`) is what actually tells it to replace the plan.
        let merged_text = if texts.len() > 1 {
            let prior = texts[..texts.len() - 1].join("\n");
            format!("{prior}\n\ncorrection: {latest}")
        } else {
            latest
        };
        return Batch { source, merged_text, batch_type: BatchType::Correction, individual_tasks: Vec::new() };
    }

    if ADDITIVE_MARKERS.iter().any(|m| latest_lower.starts_with(m)) && texts.len() > 1 {
        let prior = texts[..texts.len() - 1].join("\n");
        let merged_text = format!("{prior} … also: {latest}");
        return Batch { source, merged_text, batch_type: BatchType::Addition, individual_tasks: Vec::new() };
    }

    if let Some(tasks) = split_multi_task(&joined) {
        return Batch { source, merged_text: joined, batch_type: BatchType::MultiTask, individual_tasks: tasks };
    }

    Batch { source, merged_text: joined, batch_type: BatchType::Single, individual_tasks: Vec::new() }
}

/// Splits `text` into individually-imperative pieces if it looks like more
/// than one task: a strong connective between clauses, a numbered list, or
/// a newline followed by another imperative-looking line.
fn split_multi_task(text: &str) -> Option<Vec<String>> {
    let lower = text.to_lowercase();
    let mut pieces: Vec<String> = Vec::new();

    if let Some(connective) = STRONG_CONNECTIVES.iter().find(|c| lower.contains(*c)) {
        let mut rest = text;
        while let Some(idx) = rest.to_lowercase().find(connective) {
            let (before, after) = rest.split_at(idx);
            let before = before.trim().trim_end_matches(',');
            if !before.is_empty() {
                pieces.push(before.to_string());
            }
            rest = after[connective.len()..].trim_start_matches(',').trim();
        }
        if !rest.is_empty() {
            pieces.push(rest.to_string());
        }
        if pieces.len() > 1 {
            return Some(pieces);
        }
        pieces.clear();
    }

    let numbered_lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let looks_numbered = numbered_lines.len() > 1
        && numbered_lines.iter().enumerate().all(|(i, l)| {
            l.starts_with(&format!("{}.", i + 1)) || l.starts_with(&format!("{})", i + 1)) || l.starts_with('-')
        });
    if looks_numbered {
        return Some(numbered_lines.iter().map(|l| l.trim_start_matches(|c: char| c.is_numeric() || c == '.' || c == ')' || c == '-').trim().to_string()).collect());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn runtime_config(window_ms: u64, max_wait_ms: u64) -> Arc<RuntimeConfig> {
        let mut config = Config::default();
        config.coalesce.window_ms = window_ms;
        config.coalesce.max_wait_ms = max_wait_ms;
        Arc::new(RuntimeConfig::new(&config))
    }

    #[tokio::test]
    async fn single_message_emits_as_single_after_window_closes() {
        let (parser, mut rx) = StreamParser::new(runtime_config(30, 10_000));
        parser.ingest("owner", "what's the weather today");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.batch_type, BatchType::Single);
        assert_eq!(batch.merged_text, "what's the weather today");
    }

    #[tokio::test]
    async fn correction_marker_keeps_every_message_but_foregrounds_the_latest() {
        let (parser, mut rx) = StreamParser::new(runtime_config(30, 10_000));
        parser.ingest("owner", "book a flight to denver");
        parser.ingest("owner", "actually make it boulder");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.batch_type, BatchType::Correction);
        assert!(batch.merged_text.contains("book a flight to denver"));
        assert!(batch.merged_text.contains("correction: actually make it boulder"));
    }

    #[tokio::test]
    async fn correction_marker_with_no_prior_message_is_just_itself() {
        let (parser, mut rx) = StreamParser::new(runtime_config(30, 10_000));
        parser.ingest("owner", "actually make it boulder");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.batch_type, BatchType::Correction);
        assert_eq!(batch.merged_text, "actually make it boulder");
    }

    #[tokio::test]
    async fn additive_marker_merges_with_prior_text() {
        let (parser, mut rx) = StreamParser::new(runtime_config(30, 10_000));
        parser.ingest("owner", "book a flight to denver");
        parser.ingest("owner", "also get a rental car");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.batch_type, BatchType::Addition);
        assert!(batch.merged_text.contains("also: also get a rental car"));
    }

    #[tokio::test]
    async fn multi_task_splits_on_strong_connective() {
        let (parser, mut rx) = StreamParser::new(runtime_config(30, 10_000));
        parser.ingest("owner", "email the report then call the plumber");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.batch_type, BatchType::MultiTask);
        assert_eq!(batch.individual_tasks.len(), 2);
        assert!(batch.individual_tasks[0].contains("email the report"));
        assert!(batch.individual_tasks[1].contains("call the plumber"));
    }

    #[tokio::test]
    async fn force_flush_empties_the_buffer_synchronously() {
        let (parser, mut rx) = StreamParser::new(runtime_config(60_000, 600_000));
        parser.ingest("owner", "hello");
        parser.flush();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.merged_text, "hello");
    }
}
