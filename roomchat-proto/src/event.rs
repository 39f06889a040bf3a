//! Named events exchanged over the relay's WebSocket channel.
//!
//! Every text frame carries exactly one event, encoded as an adjacently
//! tagged JSON object:
//!
//! ```json
//! {"event": "join-room", "data": {"roomID": "abcde1", "username": "bob"}}
//! ```
//!
//! Events without a payload (`leave-room`) omit `data`.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::room::{Ack, JoinRoom, SendMessage};
use crate::typing::TypingState;

/// Error type for event encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or does not match any known event.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Events sent by clients to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Associate a persistent user id with the sending connection.
    RegisterUser(String),
    /// Create an empty room with the given id.
    CreateRoom(String),
    /// Join an existing room.
    JoinRoom(JoinRoom),
    /// Post a message to a room.
    SendMessage(SendMessage),
    /// Report a typing state change.
    Typing(TypingState),
    /// Leave every room the connection belongs to.
    LeaveRoom,
}

impl ClientEvent {
    /// Wire name of the event, as it appears in the `event` field.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RegisterUser(_) => "register-user",
            Self::CreateRoom(_) => "create-room",
            Self::JoinRoom(_) => "join-room",
            Self::SendMessage(_) => "send-message",
            Self::Typing(_) => "typing",
            Self::LeaveRoom => "leave-room",
        }
    }
}

/// Events sent by the relay to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Reply to `create-room` or `join-room`, delivered to the caller only.
    Ack(Ack),
    /// Room backlog, delivered to a new joiner only.
    PreviousMessages(Vec<ChatMessage>),
    /// Display names of the room's current members, in join order.
    UpdateUsers(Vec<String>),
    /// A message posted by another member.
    ReceiveMessage(ChatMessage),
    /// Another member started typing.
    UserTyping(String),
    /// Another member stopped typing.
    UserStoppedTyping(String),
}

/// Decodes a client event from a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the frame is not a known event.
pub fn decode_client(text: &str) -> Result<ClientEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a client event into a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_client(event: &ClientEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes a server event from a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the frame is not a known event.
pub fn decode_server(text: &str) -> Result<ServerEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a server event into a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}
