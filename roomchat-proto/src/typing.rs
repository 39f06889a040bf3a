//! Typing indicator payload.

use serde::{Deserialize, Serialize};

/// A typing state change sent by a client while composing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingState {
    /// The room where typing is occurring.
    #[serde(rename = "roomID")]
    pub room_id: String,
    /// Display name of the typist.
    pub username: String,
    /// Whether the user is currently typing (`true`) or stopped (`false`).
    pub typing: bool,
}
