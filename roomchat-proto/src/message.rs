//! Chat message payload carried by `send-message`, `receive-message` and
//! `previous-messages`.

use serde::{Deserialize, Serialize};

/// A single chat line as stored in a room backlog and relayed to members.
///
/// The timestamp is formatted by the sending client and is never parsed by
/// the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the author.
    pub username: String,
    /// Text body.
    pub message: String,
    /// Client-formatted timestamp, opaque to the relay.
    pub timestamp: String,
}

impl ChatMessage {
    /// Builds a message from its three parts.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }
}
