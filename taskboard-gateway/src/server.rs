//! WebSocket event server.
//!
//! Upgrades connections on `/ws`, registers each one with the
//! [`EventBroadcaster`], and forwards published events as JSON text frames.
//! The socket is event-only: incoming frames other than close are ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use taskboard_proto::event;

use crate::events::EventBroadcaster;

/// Handles one upgraded subscriber connection until it closes.
pub async fn handle_socket(socket: WebSocket, broadcaster: Arc<EventBroadcaster>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (id, mut events) = broadcaster.subscribe().await;
    tracing::info!(subscriber = %id, "event subscriber connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(board_event) = events.recv().await {
            let json = match event::encode(&board_event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => break,
                _ => {
                    // Event channel is one-way; ignore client frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    broadcaster.unsubscribe(id).await;
    tracing::info!(subscriber = %id, "event subscriber disconnected");
}

/// Starts the event server on the given address, returning the bound
/// address and a join handle.
///
/// The bound address matters when binding to port 0 in tests.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the address.
pub async fn start_server(
    addr: &str,
    broadcaster: Arc<EventBroadcaster>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(broadcaster);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "event server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(broadcaster): axum::extract::State<Arc<EventBroadcaster>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}
