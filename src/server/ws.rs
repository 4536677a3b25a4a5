//! WebSocket handling for the broadcast server.
//!
//! Each connection runs a select loop over its inbound frames and its
//! outbound envelope queue. All shared state lives in the room
//! registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::{ClientEnvelope, ServerEnvelope};
use crate::room::{ConnectionId, EnvelopeSender, RoomRegistry};

/// Shared state for the broadcast server.
pub struct ServerState {
    registry: RoomRegistry,
    next_id: AtomicU64,
    active: AtomicU64,
}

impl ServerState {
    /// Create server state with the given per-room history capacity.
    pub fn new(history_size: usize) -> Self {
        Self {
            registry: RoomRegistry::new(history_size),
            next_id: AtomicU64::new(1),
            active: AtomicU64::new(0),
        }
    }

    /// The room registry.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Number of currently connected clients.
    pub fn active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Build the router: a single WebSocket upgrade route at the root.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one client connection until its transport closes.
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let active = state.active.fetch_add(1, Ordering::Relaxed) + 1;
    debug!("Connection {} established ({} active)", id, active);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound queue: the registry fans out into this without awaiting.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEnvelope>();

    // Display name, bound by the first message envelope.
    let mut username: Option<String> = None;

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(" <- {}: {}", username.as_deref().unwrap_or("-"), text);
                        match serde_json::from_str::<ClientEnvelope>(&text) {
                            Ok(envelope) => {
                                handle_envelope(&state, id, &tx, &mut username, envelope).await;
                            }
                            Err(e) => {
                                // Malformed input is dropped; the connection survives.
                                debug!("Bad envelope on connection {}: {}", id, e);
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Connection {} transport error: {}", id, e);
                        break;
                    }
                }
            }

            outbound = rx.recv() => {
                // `tx` is held in this scope, so recv never yields None here.
                if let Some(envelope) = outbound {
                    match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("Failed to encode envelope: {}", e),
                    }
                }
            }
        }
    }

    state.registry.part_all(id).await;
    state.active.fetch_sub(1, Ordering::Relaxed);
    info!(
        "Peer {} (connection {}) disconnected",
        username.as_deref().unwrap_or("unregistered"),
        id
    );
}

/// Apply one decoded client envelope.
async fn handle_envelope(
    state: &ServerState,
    id: ConnectionId,
    tx: &EnvelopeSender,
    username: &mut Option<String>,
    envelope: ClientEnvelope,
) {
    match envelope {
        ClientEnvelope::Join { room } => {
            state.registry.join(&room, id, tx.clone()).await;
        }

        ClientEnvelope::Part { room } => {
            state.registry.part(&room, id).await;
        }

        ClientEnvelope::History { room } => {
            // Snapshot goes back to the requester only, via its own queue.
            let history = state.registry.history_snapshot(&room).await;
            let _ = tx.send(ServerEnvelope::History { history });
        }

        ClientEnvelope::Message {
            room,
            text,
            author,
            spoof,
        } => match username {
            None => {
                // The first message binds the display name; nothing is
                // broadcast.
                info!("Connection {} registered as {}", id, text);
                *username = Some(text);
            }
            Some(name) => {
                let author = if spoof {
                    author.unwrap_or_else(|| name.clone())
                } else {
                    // An author supplied without spoof is ignored.
                    name.clone()
                };
                state.registry.publish(&room, &author, &text).await;
            }
        },
    }
}
