//! Integration tests for the room relay over real WebSocket connections.
//!
//! Each test starts the relay on an OS-assigned port and drives it with
//! `tokio-tungstenite` clients speaking the JSON event protocol.
//!
//! Verification command: `cargo test --test room_relay`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use roomchat_proto::event::{self, ClientEvent, ServerEvent};
use roomchat_proto::message::ChatMessage;
use roomchat_proto::room::{Ack, AckRequest, JoinRoom, SendMessage};
use roomchat_proto::typing::TypingState;
use roomchat_relay::relay::{RelayState, start_server, start_server_with_state};

// =============================================================================
// Type aliases and helpers
// =============================================================================

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long to wait before concluding that nothing more will arrive.
const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Starts a relay server on a random port for testing.
async fn start_relay() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test relay")
}

/// Opens a WebSocket connection to the relay.
async fn connect(addr: std::net::SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

/// Sends a client event as a text frame.
async fn send(ws: &mut WsStream, event: &ClientEvent) {
    let text = event::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Text(text.into()))
        .await
        .unwrap();
}

/// Receives and decodes the next server event.
async fn recv(ws: &mut WsStream) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    event::decode_server(msg.to_text().unwrap()).unwrap()
}

/// Asserts that no frame arrives within [`QUIET_PERIOD`].
async fn assert_silent(ws: &mut WsStream) {
    if let Ok(Some(Ok(msg))) = tokio::time::timeout(QUIET_PERIOD, ws.next()).await {
        panic!("expected silence, got {msg:?}");
    }
}

fn create(room_id: &str) -> ClientEvent {
    ClientEvent::CreateRoom(room_id.to_string())
}

fn join(room_id: &str, username: &str) -> ClientEvent {
    ClientEvent::JoinRoom(JoinRoom {
        room_id: room_id.to_string(),
        username: username.to_string(),
    })
}

fn say(room_id: &str, username: &str, text: &str) -> ClientEvent {
    ClientEvent::SendMessage(SendMessage {
        room_id: room_id.to_string(),
        message: text.to_string(),
        username: username.to_string(),
        timestamp: "12:00 PM".to_string(),
    })
}

fn typing(room_id: &str, username: &str, typing: bool) -> ClientEvent {
    ClientEvent::Typing(TypingState {
        room_id: room_id.to_string(),
        username: username.to_string(),
        typing,
    })
}

fn users(names: &[&str]) -> ServerEvent {
    ServerEvent::UpdateUsers(names.iter().map(|n| (*n).to_string()).collect())
}

/// Creates `room_id` and joins it, consuming every reply. Returns the backlog.
async fn create_and_join(ws: &mut WsStream, room_id: &str, username: &str) -> Vec<ChatMessage> {
    send(ws, &create(room_id)).await;
    assert_eq!(recv(ws).await, ServerEvent::Ack(Ack::ok(AckRequest::CreateRoom)));
    join_existing(ws, room_id, username).await.1
}

/// Joins an existing room, consuming the ack, roster and backlog.
/// Returns `(roster, backlog)`.
async fn join_existing(
    ws: &mut WsStream,
    room_id: &str,
    username: &str,
) -> (Vec<String>, Vec<ChatMessage>) {
    send(ws, &join(room_id, username)).await;
    assert_eq!(recv(ws).await, ServerEvent::Ack(Ack::ok(AckRequest::JoinRoom)));
    let ServerEvent::UpdateUsers(roster) = recv(ws).await else {
        panic!("expected update-users after join");
    };
    let ServerEvent::PreviousMessages(backlog) = recv(ws).await else {
        panic!("expected previous-messages after join");
    };
    (roster, backlog)
}

// =============================================================================
// Room creation
// =============================================================================

#[tokio::test]
async fn duplicate_create_fails_without_touching_room() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut mallory = connect(addr).await;

    create_and_join(&mut alice, "lobby", "alice").await;
    send(&mut alice, &say("lobby", "alice", "first")).await;

    send(&mut mallory, &create("lobby")).await;
    assert_eq!(
        recv(&mut mallory).await,
        ServerEvent::Ack(Ack::failed(AckRequest::CreateRoom, "Room already exists!"))
    );
    assert_silent(&mut alice).await;

    // The existing room still has its member and its backlog.
    let mut bob = connect(addr).await;
    let (roster, backlog) = join_existing(&mut bob, "lobby", "bob").await;
    assert_eq!(roster, vec!["alice", "bob"]);
    assert_eq!(backlog, vec![ChatMessage::new("alice", "first", "12:00 PM")]);
}

#[tokio::test]
async fn join_missing_room_fails_without_broadcast() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    create_and_join(&mut alice, "real", "alice").await;

    send(&mut bob, &join("imaginary", "bob")).await;
    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::Ack(Ack::failed(AckRequest::JoinRoom, "Room does not exist!"))
    );
    assert_silent(&mut bob).await;
    assert_silent(&mut alice).await;
}

// =============================================================================
// Messaging
// =============================================================================

#[tokio::test]
async fn message_reaches_others_but_not_sender() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    let mut carol = connect(addr).await;

    create_and_join(&mut alice, "r", "alice").await;
    join_existing(&mut bob, "r", "bob").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));
    join_existing(&mut carol, "r", "carol").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob", "carol"]));
    assert_eq!(recv(&mut bob).await, users(&["alice", "bob", "carol"]));

    send(&mut alice, &say("r", "alice", "hello all")).await;
    let expected = ServerEvent::ReceiveMessage(ChatMessage::new("alice", "hello all", "12:00 PM"));
    assert_eq!(recv(&mut bob).await, expected);
    assert_eq!(recv(&mut carol).await, expected);
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn messages_do_not_cross_rooms() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "red", "alice").await;
    create_and_join(&mut bob, "blue", "bob").await;

    send(&mut alice, &say("red", "alice", "only red")).await;
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn backlog_keeps_latest_hundred_in_order() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "busy", "alice").await;
    join_existing(&mut bob, "busy", "bob").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));

    for i in 0..130 {
        send(&mut alice, &say("busy", "alice", &format!("msg {i}"))).await;
    }
    // Bob seeing the last message means the relay has stored all of them.
    for i in 0..130 {
        let ServerEvent::ReceiveMessage(msg) = recv(&mut bob).await else {
            panic!("expected receive-message");
        };
        assert_eq!(msg.message, format!("msg {i}"));
    }

    let mut carol = connect(addr).await;
    let (_, backlog) = join_existing(&mut carol, "busy", "carol").await;
    assert_eq!(backlog.len(), 100);
    let texts: Vec<String> = backlog.into_iter().map(|m| m.message).collect();
    let expected: Vec<String> = (30..130).map(|i| format!("msg {i}")).collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn configured_backlog_capacity_applies() {
    let state = std::sync::Arc::new(RelayState::with_config(64 * 1024, 3));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state)
        .await
        .unwrap();
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "tiny", "alice").await;
    join_existing(&mut bob, "tiny", "bob").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));

    for i in 0..5 {
        send(&mut alice, &say("tiny", "alice", &format!("m{i}"))).await;
        recv(&mut bob).await;
    }

    let mut carol = connect(addr).await;
    let (_, backlog) = join_existing(&mut carol, "tiny", "carol").await;
    let texts: Vec<String> = backlog.into_iter().map(|m| m.message).collect();
    assert_eq!(texts, vec!["m2", "m3", "m4"]);
}

// =============================================================================
// Typing indicators
// =============================================================================

#[tokio::test]
async fn typing_relayed_to_others_only_and_not_stored() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "r", "alice").await;
    join_existing(&mut bob, "r", "bob").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));

    send(&mut alice, &typing("r", "alice", true)).await;
    assert_eq!(recv(&mut bob).await, ServerEvent::UserTyping("alice".into()));

    send(&mut alice, &typing("r", "alice", false)).await;
    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::UserStoppedTyping("alice".into())
    );
    assert_silent(&mut alice).await;

    let mut carol = connect(addr).await;
    let (_, backlog) = join_existing(&mut carol, "r", "carol").await;
    assert!(backlog.is_empty());
}

// =============================================================================
// Leaving and disconnecting
// =============================================================================

#[tokio::test]
async fn leave_room_updates_remaining_members() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "r", "alice").await;
    join_existing(&mut bob, "r", "bob").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));

    send(&mut bob, &ClientEvent::LeaveRoom).await;
    assert_eq!(recv(&mut alice).await, users(&["alice"]));

    // Bob no longer hears the room.
    send(&mut alice, &say("r", "alice", "still here?")).await;
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn last_member_leaving_removes_room() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "short-lived", "alice").await;
    send(&mut alice, &say("short-lived", "alice", "echo")).await;
    alice.close(None).await.unwrap();
    drop(alice);

    // Give the relay a moment to process the close.
    tokio::time::sleep(QUIET_PERIOD).await;

    send(&mut bob, &join("short-lived", "bob")).await;
    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::Ack(Ack::failed(AckRequest::JoinRoom, "Room does not exist!"))
    );

    // The id is free again and the new room starts with no history.
    let backlog = create_and_join(&mut bob, "short-lived", "bob").await;
    assert!(backlog.is_empty());
}

#[tokio::test]
async fn example_scenario() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    send(&mut alice, &ClientEvent::RegisterUser("alice-uuid".into())).await;
    send(&mut bob, &ClientEvent::RegisterUser("bob-uuid".into())).await;

    create_and_join(&mut alice, "abcde1", "alice").await;

    let (roster, backlog) = join_existing(&mut bob, "abcde1", "bob").await;
    assert!(backlog.is_empty());
    assert_eq!(roster, vec!["alice", "bob"]);
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));

    send(&mut alice, &say("abcde1", "alice", "hi")).await;
    assert_eq!(
        recv(&mut bob).await,
        ServerEvent::ReceiveMessage(ChatMessage::new("alice", "hi", "12:00 PM"))
    );
    assert_silent(&mut alice).await;

    bob.close(None).await.unwrap();
    assert_eq!(recv(&mut alice).await, users(&["alice"]));
}

#[tokio::test]
async fn disconnect_cleans_every_joined_room() {
    let state = std::sync::Arc::new(RelayState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", std::sync::Arc::clone(&state))
        .await
        .unwrap();
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    create_and_join(&mut alice, "one", "alice").await;
    create_and_join(&mut alice, "two", "alice").await;
    join_existing(&mut bob, "two", "bob").await;
    assert_eq!(recv(&mut alice).await, users(&["alice", "bob"]));

    alice.close(None).await.unwrap();
    assert_eq!(recv(&mut bob).await, users(&["bob"]));

    assert_eq!(state.room_members("one").await, None);
    assert_eq!(state.room_members("two").await, Some(vec!["bob".to_string()]));
    assert_eq!(state.room_count().await, 1);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let (addr, _handle) = start_relay().await;
    let mut alice = connect(addr).await;

    alice
        .send(tungstenite::Message::Text("definitely not json".into()))
        .await
        .unwrap();
    alice
        .send(tungstenite::Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();
    assert_silent(&mut alice).await;

    // The connection is still usable.
    let backlog = create_and_join(&mut alice, "after-noise", "alice").await;
    assert!(backlog.is_empty());
}
