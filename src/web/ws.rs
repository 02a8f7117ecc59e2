//! WebSocket bridge between client sockets and the stream server
//!
//! Each socket gets a server-assigned id and a `ChannelTransport`. Inbound
//! frames become `TransportEvent`s on the server's event channel; outbound
//! messages are drained from the transport's queue by the same task. The
//! server loop never awaits a socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;
use crate::stream::{ChannelTransport, ConnectionId, Outbound, TransportEvent};

/// Heartbeat interval
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How a socket session ended
#[derive(Debug)]
enum SocketEnd {
    /// Peer closed or the stream ended
    Peer,
    /// Read or write error
    Failed(String),
    /// The server closed the connection
    Server,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let id: ConnectionId = Uuid::new_v4();
    let (transport, mut outbound) =
        ChannelTransport::channel(id, state.send_queue_capacity(), state.throttler.clone());

    if state
        .events
        .send(TransportEvent::Opened {
            id,
            transport: Arc::new(transport),
        })
        .await
        .is_err()
    {
        warn!(id = %id, "Stream server is not running, dropping socket");
        return;
    }

    info!(id = %id, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = tokio::time::interval(PING_INTERVAL);

    let end = loop {
        tokio::select! {
            msg = receiver.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(payload))) => TransportEvent::Text { id, payload },
                    Some(Ok(Message::Binary(data))) => TransportEvent::Binary {
                        id,
                        payload: Bytes::from(data),
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break SocketEnd::Peer,
                    Some(Err(e)) => break SocketEnd::Failed(e.to_string()),
                };
                if state.events.send(event).await.is_err() {
                    break SocketEnd::Server;
                }
            }

            out = outbound.recv() => {
                let message = match out {
                    Some(Outbound::Text(text)) => Message::Text(text),
                    Some(Outbound::Binary(data)) => Message::Binary(data.to_vec()),
                    Some(Outbound::Close) | None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break SocketEnd::Server;
                    }
                };
                if let Err(e) = sender.send(message).await {
                    break SocketEnd::Failed(e.to_string());
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = sender.send(Message::Ping(Vec::new())).await {
                    break SocketEnd::Failed(e.to_string());
                }
            }
        }
    };

    // Closing our half makes later sends from the server fail fast
    outbound.close();
    debug!(id = %id, "WebSocket handler exiting ({:?})", end);

    let event = match end {
        SocketEnd::Peer => Some(TransportEvent::Closed { id }),
        SocketEnd::Failed(reason) => {
            warn!(id = %id, "WebSocket error: {}", reason);
            Some(TransportEvent::Failed { id, reason })
        }
        SocketEnd::Server => None,
    };
    if let Some(event) = event {
        let _ = state.events.send(event).await;
    }
    info!(id = %id, "WebSocket client disconnected");
}
