//! Relay server core: shared state, WebSocket handler, and delivery.
//!
//! Every upgraded WebSocket becomes a connection with its own
//! [`ConnectionId`] and outbound channel. Inbound text frames are decoded
//! into [`ClientEvent`]s and handed to the [`Dispatcher`]; the resulting
//! outbound events are pushed into the recipients' channels before the
//! dispatcher lock is released, so all clients observe room changes in the
//! same order.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use roomchat_proto::event::{self, ClientEvent};
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::backlog::DEFAULT_BACKLOG_CAPACITY;
use crate::connections::ConnectionId;
use crate::dispatch::{Dispatcher, Outbound};

/// Default maximum allowed inbound frame size in bytes (64 KB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared relay server state: live connections plus the dispatcher.
pub struct RelayState {
    /// Maps each live connection to the sender feeding its WebSocket writer.
    peers: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
    /// Room registry and user directory. Lock before `peers`, never after.
    dispatcher: Mutex<Dispatcher>,
    /// Maximum allowed inbound frame size in bytes.
    max_payload_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a new relay state with no connections and no rooms, using
    /// default frame size and backlog limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_BACKLOG_CAPACITY)
    }

    /// Creates a new relay state with custom frame size and backlog limits.
    #[must_use]
    pub fn with_config(max_payload_size: usize, backlog_capacity: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            dispatcher: Mutex::new(Dispatcher::with_backlog_capacity(backlog_capacity)),
            max_payload_size,
        }
    }

    /// Registers the outbound channel of a freshly upgraded connection.
    pub async fn attach(&self, conn: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        let mut peers = self.peers.write().await;
        peers.insert(conn, sender);
    }

    /// Removes a connection's outbound channel, returning it if it existed.
    pub async fn detach(&self, conn: ConnectionId) -> Option<mpsc::UnboundedSender<Message>> {
        let mut peers = self.peers.write().await;
        peers.remove(&conn)
    }

    /// Applies an inbound event and delivers everything it causes.
    ///
    /// Both locks are taken before the registry is touched, so a cancelled
    /// caller never leaves a mutation without its fan-out.
    pub async fn handle_event(&self, from: ConnectionId, event: ClientEvent) {
        let mut dispatcher = self.dispatcher.lock().await;
        let peers = self.peers.read().await;
        let outbound = dispatcher.dispatch(from, event);
        deliver(&peers, outbound);
    }

    /// Removes a closed connection from every room and from the user
    /// directory, notifying the remaining members.
    pub async fn handle_disconnect(&self, conn: ConnectionId) {
        let mut dispatcher = self.dispatcher.lock().await;
        let peers = self.peers.read().await;
        let outbound = dispatcher.disconnect(conn);
        deliver(&peers, outbound);
    }

    /// Display names of a room's members, or `None` if the room is gone.
    pub async fn room_members(&self, room_id: &str) -> Option<Vec<String>> {
        let dispatcher = self.dispatcher.lock().await;
        dispatcher.rooms().get(room_id).map(crate::rooms::Room::usernames)
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.dispatcher.lock().await.rooms().len()
    }
}

/// Pushes outbound events into the recipients' channels.
///
/// Recipients that have already gone away are skipped.
fn deliver(
    peers: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    outbound: Vec<Outbound>,
) {
    for Outbound { to, event } in outbound {
        let Some(sender) = peers.get(&to) else {
            continue;
        };
        match event::encode_server(&event) {
            Ok(text) => {
                let _ = sender.send(Message::Text(text.into()));
            }
            Err(e) => {
                tracing::error!(conn = %to, error = %e, "failed to encode outbound event");
            }
        }
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Mint a [`ConnectionId`] and attach the connection's outbound channel.
/// 2. Spawn a writer task draining the channel into the socket.
/// 3. Decode and dispatch inbound text frames until the socket closes.
/// 4. Detach, then run disconnect cleanup for the connection's rooms.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.attach(conn, tx).await;
    tracing::info!(conn = %conn, "client connected");

    // Spawn a writer task that forwards messages from the channel to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn = %conn, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming frames from this client.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_frame(conn, text.as_str(), &reader_state).await;
                }
                Message::Binary(data) => {
                    tracing::warn!(conn = %conn, len = data.len(), "ignoring binary frame");
                }
                Message::Close(_) => {
                    tracing::info!(conn = %conn, "received close frame");
                    break;
                }
                _ => {
                    // Ping and pong are answered by the transport.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.detach(conn).await;
    state.handle_disconnect(conn).await;
    tracing::info!(conn = %conn, "client disconnected");
}

/// Decodes a text frame and hands the event to the dispatcher.
///
/// Oversized or malformed frames are dropped without a reply.
async fn handle_text_frame(conn: ConnectionId, text: &str, state: &RelayState) {
    if text.len() > state.max_payload_size {
        tracing::warn!(
            conn = %conn,
            size = text.len(),
            max = state.max_payload_size,
            "frame exceeds size limit, dropped"
        );
        return;
    }

    match event::decode_client(text) {
        Ok(event) => state.handle_event(conn, event).await,
        Err(e) => {
            tracing::warn!(conn = %conn, error = %e, "failed to decode event");
        }
    }
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Use [`RelayState::with_config`] to create a state with the limits from
/// the resolved [`crate::config::RelayConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
