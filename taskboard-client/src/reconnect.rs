//! WebSocket event stream supervision.
//!
//! One supervisor loop owns the connection lifecycle, so there is never
//! more than one outstanding reconnect timer. Every (re)connect triggers a
//! full resync through the board client, covering events missed while
//! disconnected.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use taskboard_proto::event;

use crate::client::BoardClient;

/// Base reconnect delay in milliseconds.
const BACKOFF_BASE_MS: u64 = 1000;

/// Ceiling on the reconnect delay in milliseconds.
const BACKOFF_CAP_MS: u64 = 8000;

/// Connection state of the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection yet.
    Disconnected,
    /// Event stream is live.
    Connected,
    /// Lost the stream; retrying with backoff.
    Reconnecting,
}

/// Delay before reconnect attempt number `attempts` (zero-based):
/// `min(1000ms × 2^attempts, 8000ms)`.
#[must_use]
pub fn backoff_delay(attempts: u32) -> Duration {
    let millis = BACKOFF_BASE_MS
        .saturating_mul(2u64.saturating_pow(attempts))
        .min(BACKOFF_CAP_MS);
    Duration::from_millis(millis)
}

/// Supervises the WebSocket connection to a gateway's `/ws` endpoint.
pub struct ReconnectManager {
    url: String,
    client: BoardClient,
    status: watch::Sender<ConnectionStatus>,
}

impl ReconnectManager {
    /// Creates a supervisor for the given gateway URL, feeding decoded
    /// events into the board client.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        client: BoardClient,
    ) -> (Self, watch::Receiver<ConnectionStatus>) {
        let (status, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        (
            Self {
                url: url.into(),
                client,
                status,
            },
            status_rx,
        )
    }

    /// Runs the connect/read/backoff loop until the board client goes away.
    pub async fn run(self) {
        let mut attempts: u32 = 0;
        loop {
            match tokio_tungstenite::connect_async(&self.url).await {
                Ok((stream, _)) => {
                    attempts = 0;
                    let _ = self.status.send(ConnectionStatus::Connected);
                    tracing::info!(url = %self.url, "event stream connected");
                    if !self.client.resync() {
                        return;
                    }
                    if !self.read_events(stream).await {
                        return;
                    }
                    tracing::warn!("event stream lost");
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, attempts, "connect failed");
                }
            }

            let _ = self.status.send(ConnectionStatus::Reconnecting);
            tokio::time::sleep(backoff_delay(attempts)).await;
            attempts = attempts.saturating_add(1);
        }
    }

    /// Reads frames until the stream ends. Returns `false` once the board
    /// client has stopped accepting events.
    async fn read_events(
        &self,
        mut stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> bool {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(json)) => match event::decode(&json) {
                    Ok(board_event) => {
                        if !self.client.apply_event(board_event) {
                            return false;
                        }
                    }
                    Err(e) => {
                        // Skip malformed frames; the next resync heals any gap.
                        tracing::warn!(error = %e, "ignoring malformed event frame");
                    }
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        true
    }
}
