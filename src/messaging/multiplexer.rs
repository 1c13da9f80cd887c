//! Message Source Multiplexer (§4.6): fans the iMessage poller and the web
//! dashboard's push queue into the Message Stream Parser, and gives the
//! Brain a single `wait_for_message` contract regardless of which source a
//! message actually arrived on.

use super::imessage::ImessagePoller;
use crate::config::{Config, RuntimeConfig};
use crate::stream_parser::{Batch, StreamParser};
use crate::InboundMessage;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// How many recent raw (pre-batch) message texts we keep around for
/// [`MessageMultiplexer::check_for_kill`] to peek at.
const KILL_PEEK_CAPACITY: usize = 32;

pub struct MessageMultiplexer {
    imessage: Option<ImessagePoller>,
    poll_interval: Duration,
    dashboard_tx: mpsc::Sender<InboundMessage>,
    dashboard_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    parser: Arc<StreamParser>,
    batch_rx: Mutex<mpsc::Receiver<Batch>>,
    recent_raw: Mutex<VecDeque<String>>,
}

impl MessageMultiplexer {
    pub fn new(config: &Config, runtime_config: Arc<RuntimeConfig>) -> Self {
        let imessage = if config.messaging.owner_address.trim().is_empty() {
            None
        } else {
            Some(ImessagePoller::new(
                config.imessage.db_path.clone(),
                config.messaging.owner_address.clone(),
                config.imessage.dedup_capacity,
            ))
        };
        let (parser, batch_rx) = StreamParser::new(runtime_config.clone());
        let (dashboard_tx, dashboard_rx) = mpsc::channel(256);

        Self {
            imessage,
            poll_interval: Duration::from_millis(config.messaging.poll_interval_ms),
            dashboard_tx,
            dashboard_rx: Mutex::new(dashboard_rx),
            parser,
            batch_rx: Mutex::new(batch_rx),
            recent_raw: Mutex::new(VecDeque::with_capacity(KILL_PEEK_CAPACITY)),
        }
    }

    /// Clone to hand to whatever pushes dashboard/tunnel messages in (the
    /// Process Supervisor & Tunnel's WS relay).
    pub fn dashboard_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.dashboard_tx.clone()
    }

    /// Runs the poll loop until the process shuts down. Spawn this once from
    /// the composition root.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.poll_imessage_once().await;
            self.drain_dashboard_queue().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn poll_imessage_once(&self) {
        let Some(imessage) = &self.imessage else { return };
        match imessage.poll().await {
            Ok(messages) => {
                for message in messages {
                    self.ingest(&message).await;
                }
            }
            Err(err) => tracing::warn!(%err, "iMessage poll tick failed"),
        }
    }

    async fn drain_dashboard_queue(&self) {
        let mut rx = self.dashboard_rx.lock().await;
        while let Ok(message) = rx.try_recv() {
            self.ingest(&message).await;
        }
    }

    async fn ingest(&self, message: &InboundMessage) {
        let text = message.content.to_string();
        if text.trim().is_empty() {
            return;
        }
        self.remember_raw(&text).await;
        self.parser.ingest(message.source.clone(), text);
    }

    async fn remember_raw(&self, text: &str) {
        let mut buf = self.recent_raw.lock().await;
        if buf.len() >= KILL_PEEK_CAPACITY {
            buf.pop_front();
        }
        buf.push_back(text.to_string());
    }

    /// Blocks for the next coalesced batch, up to `timeout`. Returns `None`
    /// on timeout; the caller (the Brain's outer loop) treats that as "no
    /// new owner input this tick" rather than an error.
    pub async fn wait_for_message(&self, timeout: Duration) -> Option<Batch> {
        let mut rx = self.batch_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Peeks the recent raw message buffer for any of `kill_words`, without
    /// consuming anything — the same text still flows through the normal
    /// batching path. Lets a running task be interrupted mid-turn by a
    /// message that hasn't finished coalescing yet.
    pub async fn check_for_kill(&self, kill_words: &[String]) -> bool {
        if kill_words.is_empty() {
            return false;
        }
        let buf = self.recent_raw.lock().await;
        buf.iter().any(|text| {
            let lower = text.to_lowercase();
            kill_words.iter().any(|word| lower.contains(&word.to_lowercase()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn multiplexer() -> MessageMultiplexer {
        let mut config = Config::default();
        config.coalesce.window_ms = 10;
        config.coalesce.max_wait_ms = 50;
        let runtime_config = Arc::new(RuntimeConfig::new(&config));
        MessageMultiplexer::new(&config, runtime_config)
    }

    #[tokio::test]
    async fn wait_for_message_times_out_with_no_input() {
        let mux = multiplexer();
        let batch = mux.wait_for_message(Duration::from_millis(20)).await;
        assert!(batch.is_none());
    }

    #[tokio::test]
    async fn check_for_kill_matches_without_consuming() {
        let mux = multiplexer();
        mux.remember_raw("please stop the deploy").await;
        assert!(mux.check_for_kill(&["stop".to_string()]).await);
        // still present: checking again doesn't consume it.
        assert!(mux.check_for_kill(&["stop".to_string()]).await);
    }

    #[tokio::test]
    async fn check_for_kill_is_false_with_no_match() {
        let mux = multiplexer();
        mux.remember_raw("how's the weather").await;
        assert!(!mux.check_for_kill(&["stop".to_string()]).await);
    }

    #[tokio::test]
    async fn dashboard_messages_reach_the_batch_channel() {
        let mux = Arc::new(multiplexer());
        let sender = mux.dashboard_sender();
        sender
            .send(InboundMessage {
                id: 1,
                source: "dashboard".into(),
                conversation_id: "owner".into(),
                sender_id: "owner".into(),
                content: crate::MessageContent::Text("hello".into()),
                timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
                metadata: Default::default(),
            })
            .await
            .unwrap();

        mux.drain_dashboard_queue().await;
        let batch = mux.wait_for_message(Duration::from_millis(200)).await;
        assert!(batch.is_some());
        assert_eq!(batch.unwrap().merged_text, "hello");
    }
}
