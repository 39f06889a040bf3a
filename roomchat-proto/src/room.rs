//! Room request payloads and acknowledgements.
//!
//! Field names follow the browser client (`roomID`), so every struct here
//! renames its Rust fields explicitly.

use serde::{Deserialize, Serialize};

/// Payload of a `join-room` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Room to join.
    #[serde(rename = "roomID")]
    pub room_id: String,
    /// Display name to appear under in the member list.
    pub username: String,
}

/// Payload of a `send-message` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Room the message is addressed to.
    #[serde(rename = "roomID")]
    pub room_id: String,
    /// Text body.
    pub message: String,
    /// Display name of the author.
    pub username: String,
    /// Client-formatted timestamp, opaque to the relay.
    pub timestamp: String,
}

/// Which request an [`Ack`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckRequest {
    /// Answer to `create-room`.
    CreateRoom,
    /// Answer to `join-room`.
    JoinRoom,
}

/// Outcome of a `create-room` or `join-room` request, sent to the caller only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// The request being answered.
    pub request: AckRequest,
    /// Whether the request succeeded.
    pub success: bool,
    /// Failure reason, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    /// A successful acknowledgement.
    #[must_use]
    pub const fn ok(request: AckRequest) -> Self {
        Self {
            request,
            success: true,
            message: None,
        }
    }

    /// A failed acknowledgement carrying a human-readable reason.
    #[must_use]
    pub fn failed(request: AckRequest, message: impl Into<String>) -> Self {
        Self {
            request,
            success: false,
            message: Some(message.into()),
        }
    }
}
