//! Bounded per-room message history.
//!
//! A [`Backlog`] keeps the most recent messages of a room in send order.
//! Once the configured capacity is exceeded the oldest message is dropped,
//! so a backlog can never hold more than its capacity.

use std::collections::VecDeque;

use roomchat_proto::message::ChatMessage;

/// Default number of messages retained per room.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of chat messages.
#[derive(Debug, Clone)]
pub struct Backlog {
    entries: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new()
    }
}

impl Backlog {
    /// Creates an empty backlog with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BACKLOG_CAPACITY)
    }

    /// Creates an empty backlog retaining at most `capacity` messages.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a message, evicting the oldest one if the cap is exceeded.
    ///
    /// Returns the evicted message, if any.
    pub fn push(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        self.entries.push_back(message);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Returns a copy of the retained messages, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }

    /// Iterates over the retained messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no messages are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
