//! Process Supervisor & Tunnel (§4.13): the only external-interface surface
//! that's expected to have an actual remote party on the other end. Process
//! control (start/stop/kill/restart/status) reuses [`crate::daemon`]'s local
//! IPC socket; this module adds a WebSocket relay to a cloud endpoint that
//! can drive that same surface remotely and gets a mirror of the event bus
//! and process output in return.

use crate::daemon::{self, DaemonPaths, IpcCommand, IpcResponse};
use crate::event_bus::EventBus;
use crate::Event;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Commands the relay accepts from the remote end.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RelayCommand {
    StartTars,
    StopTars,
    KillTars,
    RestartTars,
    GetProcessStatus,
    SendTask { text: String },
    SendMessage { text: String },
}

/// Frames the relay emits toward the remote end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum RelayFrame {
    TarsOutput { line: String },
    TarsProcessStatus { running: bool, pid: Option<u32>, uptime_seconds: Option<u64> },
    Event { event: Event },
    Error { message: String },
}

/// Inbound requests the relay can't satisfy itself (`send_task` /
/// `send_message`) are handed to the rest of the system through this
/// channel rather than the tunnel owning a Dispatcher/Mux reference
/// directly — keeps this module a thin transport.
pub struct Tunnel {
    paths: DaemonPaths,
    relay_url: Option<String>,
    relay_token: Option<String>,
    event_bus: Arc<EventBus>,
    inbound_tx: mpsc::Sender<RelayCommand>,
}

impl Tunnel {
    pub fn new(paths: DaemonPaths, relay_url: Option<String>, relay_token: Option<String>, event_bus: Arc<EventBus>) -> (Self, mpsc::Receiver<RelayCommand>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        (
            Self {
                paths,
                relay_url,
                relay_token,
                event_bus,
                inbound_tx,
            },
            inbound_rx,
        )
    }

    /// Runs the reconnect loop forever. A missing `relay_url` means the
    /// tunnel is disabled; this returns immediately rather than busy-looping.
    pub async fn run(self) {
        let Some(url) = self.relay_url.clone() else {
            tracing::info!("no relay URL configured, tunnel disabled");
            return;
        };

        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.connect_and_serve(&url).await {
                Ok(()) => {
                    tracing::info!("tunnel connection closed cleanly, reconnecting");
                    backoff = INITIAL_BACKOFF;
                }
                Err(err) => {
                    tracing::warn!(%err, backoff_secs = backoff.as_secs(), "tunnel connection failed, backing off");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_and_serve(&self, url: &str) -> anyhow::Result<()> {
        let mut request = url.into_client_request()?;
        if let Some(token) = &self.relay_token {
            request
                .headers_mut()
                .insert("Authorization", format!("Bearer {token}").parse()?);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws.split();

        let mut events = self.event_bus.subscribe();

        loop {
            tokio::select! {
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(err) = self.handle_incoming(&text, &mut write).await {
                                tracing::warn!(%err, "failed to handle relay command");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            let frame = RelayFrame::Event { event };
                            send_frame(&mut write, &frame).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }

    async fn handle_incoming(
        &self,
        text: &str,
        write: &mut (impl futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    ) -> anyhow::Result<()> {
        let command: RelayCommand = serde_json::from_str(text)?;

        match &command {
            RelayCommand::StartTars => {
                let frame = RelayFrame::TarsOutput { line: "already running (the relay connects from within the process)".into() };
                send_frame(write, &frame).await?;
            }
            RelayCommand::StopTars | RelayCommand::KillTars => {
                match daemon::send_command(&self.paths, IpcCommand::Shutdown).await {
                    Ok(IpcResponse::Ok) => send_frame(write, &RelayFrame::TarsOutput { line: "shutdown requested".into() }).await?,
                    Ok(other) => send_frame(write, &RelayFrame::TarsOutput { line: format!("{other:?}") }).await?,
                    Err(err) => send_frame(write, &RelayFrame::Error { message: err.to_string() }).await?,
                }
            }
            RelayCommand::RestartTars => {
                send_frame(write, &RelayFrame::TarsOutput { line: "restart is handled by the supervised process wrapper, not the tunnel".into() }).await?;
            }
            RelayCommand::GetProcessStatus => {
                let status = daemon::is_running(&self.paths);
                let frame = RelayFrame::TarsProcessStatus {
                    running: status.is_some(),
                    pid: status,
                    uptime_seconds: None,
                };
                send_frame(write, &frame).await?;
            }
            RelayCommand::SendTask { .. } | RelayCommand::SendMessage { .. } => {
                if self.inbound_tx.send(command.clone()).await.is_err() {
                    send_frame(write, &RelayFrame::Error { message: "no inbound handler registered".into() }).await?;
                }
            }
        }

        Ok(())
    }
}

async fn send_frame(
    write: &mut (impl futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    frame: &RelayFrame,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(frame)?;
    write.send(Message::Text(json.into())).await?;
    Ok(())
}

use tokio_tungstenite::tungstenite::client::IntoClientRequest;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_command_deserializes_by_tag() {
        let cmd: RelayCommand = serde_json::from_str(r#"{"command":"send_message","text":"hi"}"#).unwrap();
        assert!(matches!(cmd, RelayCommand::SendMessage { text } if text == "hi"));
    }

    #[test]
    fn relay_frame_serializes_with_frame_tag() {
        let frame = RelayFrame::TarsOutput { line: "hello".into() };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"frame\":\"tars_output\""));
    }

    #[test]
    fn backoff_doubles_and_caps_at_max() {
        let mut backoff = INITIAL_BACKOFF;
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }
}
