//! Push-feed WebSocket client.
//!
//! One persistent connection to the backend's `/ws` endpoint. Frames are
//! tagged envelopes `{type, payload}`; they are decoded and reconciled
//! strictly in arrival order through the monitor's single apply path.
//! Malformed frames and unknown types are dropped without touching state.
//!
//! The core contract is a single session (`Connecting -> Open -> Closed`,
//! no automatic retry); `run` wraps it in the usual reconnect-with-backoff
//! loop for the long-lived monitor process.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::state::{MonitorHandle, StreamEvent};
use crate::models::{FraudAlert, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

pub struct StreamClient {
    ws_url: String,
    monitor: MonitorHandle,
    highlight_ttl: Duration,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
}

impl StreamClient {
    /// Build a client and the receiver the UI watches for connectivity.
    pub fn new(
        ws_url: impl Into<String>,
        monitor: MonitorHandle,
        highlight_ttl: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        (
            Self {
                ws_url: ws_url.into(),
                monitor,
                highlight_ttl,
                state_tx,
                shutdown,
            },
            state_rx,
        )
    }

    /// Keep one session alive, reconnecting with exponential backoff until
    /// shutdown. Reconnection is a decoration around `connect_and_stream`;
    /// the session contract itself never retries.
    pub async fn run(self) -> Result<()> {
        let mut reconnect_delay = Duration::from_secs(1);
        let max_reconnect_delay = Duration::from_secs(30);
        let mut shutdown = self.shutdown.clone();

        loop {
            match self.connect_and_stream().await {
                Ok(SessionEnd::Shutdown) => {
                    info!("stream client shut down");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => {
                    reconnect_delay = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(error = %e, "push feed disconnected; reconnecting");
                }
            }

            tokio::select! {
                _ = sleep(reconnect_delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("stream client shut down");
                    return Ok(());
                }
            }
            reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
        }
    }

    /// One full session: connect, stream frames until the feed drops or
    /// shutdown fires. `Open` is only reachable from `Connecting`; `Closed`
    /// is reachable from anywhere, including a failed connect.
    async fn connect_and_stream(&self) -> Result<SessionEnd> {
        let mut shutdown = self.shutdown.clone();
        let _ = self.state_tx.send(ConnectionState::Connecting);
        info!(url = %self.ws_url, "🔌 connecting to push feed");

        let connect = connect_async(self.ws_url.as_str());
        let ws_stream = tokio::select! {
            result = connect => {
                match result {
                    Ok((stream, resp)) => {
                        info!(status = %resp.status(), "✅ push feed connected");
                        stream
                    }
                    Err(e) => {
                        let _ = self.state_tx.send(ConnectionState::Closed);
                        return Err(e).context("connect to push feed");
                    }
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = self.state_tx.send(ConnectionState::Closed);
                return Ok(SessionEnd::Shutdown);
            }
        };

        let _ = self.state_tx.send(ConnectionState::Open);
        let (mut write, mut read) = ws_stream.split();

        let end = loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
                ws_msg = read.next() => {
                    let Some(ws_msg) = ws_msg else {
                        break SessionEnd::Disconnected;
                    };
                    match ws_msg {
                        Ok(Message::Text(text)) => {
                            self.dispatch(&text);
                        }
                        Ok(Message::Ping(payload)) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "push feed close frame");
                            break SessionEnd::Disconnected;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = self.state_tx.send(ConnectionState::Closed);
                            return Err(anyhow::anyhow!("push feed error: {e}"));
                        }
                    }
                }
            }
        };

        let _ = self.state_tx.send(ConnectionState::Closed);
        Ok(end)
    }

    /// Decode and reconcile one frame. Runs to completion before the next
    /// frame is read, so the buffers never see a partial update.
    fn dispatch(&self, text: &str) {
        match decode_frame(text) {
            Some(StreamEvent::Transaction(mut tx)) => {
                tx.is_new = true;
                let id = tx.id;
                debug!(?id, user = %tx.user_id, amount = tx.amount, "new transaction");
                self.monitor.apply(StreamEvent::Transaction(tx));
                if let Some(id) = id {
                    tokio::spawn(schedule_highlight_clear(
                        self.monitor.clone(),
                        id,
                        self.highlight_ttl,
                        self.shutdown.clone(),
                    ));
                }
            }
            Some(StreamEvent::Alert(alert)) => {
                info!(rule = alert.reason(), user = ?alert.user_id, "🚨 fraud alert");
                self.monitor.apply(StreamEvent::Alert(alert));
            }
            None => {}
        }
    }
}

/// Resolve once the shutdown flag flips to true (or the sender is gone).
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Clear the `is_new` highlight after the configured duration. Skipped when
/// shutdown wins the race: no buffer mutation after disconnect.
pub(crate) async fn schedule_highlight_clear(
    monitor: MonitorHandle,
    id: i64,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = sleep(ttl) => monitor.clear_highlight(id),
        _ = wait_for_shutdown(&mut shutdown) => {}
    }
}

/// Decode a tagged envelope. Unknown types and malformed payloads are
/// dropped; a bad frame must never desynchronize the buffers.
pub fn decode_frame(text: &str) -> Option<StreamEvent> {
    let json: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "dropping non-JSON frame");
            return None;
        }
    };

    let msg_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let payload = json.get("payload").cloned().unwrap_or(serde_json::Value::Null);

    match msg_type {
        "new_transaction" => match serde_json::from_value::<Transaction>(payload) {
            Ok(tx) => Some(StreamEvent::Transaction(tx)),
            Err(e) => {
                debug!(error = %e, "dropping malformed new_transaction payload");
                None
            }
        },
        "fraud_alert" => match serde_json::from_value::<FraudAlert>(payload) {
            Ok(alert) => Some(StreamEvent::Alert(alert)),
            Err(e) => {
                debug!(error = %e, "dropping malformed fraud_alert payload");
                None
            }
        },
        other => {
            debug!(msg_type = other, "dropping unknown frame type");
            None
        }
    }
}
