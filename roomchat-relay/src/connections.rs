//! Connection identifiers and the persistent-user directory.
//!
//! Every upgraded WebSocket gets a fresh [`ConnectionId`]. Clients may
//! additionally register a persistent user id that survives reconnects; the
//! [`ConnectionDirectory`] maps that id to whichever connection currently
//! holds it. The mapping is bookkeeping only and grants no privileges.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

/// Transport-owned identifier of a single live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mints a new, time-ordered connection id (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Two-way map between persistent user ids and live connections.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    by_user: HashMap<String, ConnectionId>,
    by_connection: HashMap<ConnectionId, String>,
}

impl ConnectionDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `conn` now speaks for `user_id`.
    ///
    /// A user id registered again from a new connection moves to that
    /// connection. A connection registering a different id drops its old one.
    /// Returns the connection that previously held `user_id`, if any.
    pub fn register(&mut self, conn: ConnectionId, user_id: &str) -> Option<ConnectionId> {
        if let Some(old_user) = self.by_connection.insert(conn, user_id.to_string())
            && old_user != user_id
            && self.by_user.get(&old_user) == Some(&conn)
        {
            self.by_user.remove(&old_user);
        }

        let previous = self.by_user.insert(user_id.to_string(), conn);
        if let Some(prev) = previous
            && prev != conn
        {
            self.by_connection.remove(&prev);
        }
        previous.filter(|prev| *prev != conn)
    }

    /// Removes `conn`, returning the user id it held.
    ///
    /// The user entry is only dropped when it still points at `conn`, so a
    /// stale disconnect cannot evict a newer connection for the same user.
    pub fn remove(&mut self, conn: ConnectionId) -> Option<String> {
        let user_id = self.by_connection.remove(&conn)?;
        if self.by_user.get(&user_id) == Some(&conn) {
            self.by_user.remove(&user_id);
        }
        Some(user_id)
    }

    /// Persistent user id registered by `conn`, if any.
    #[must_use]
    pub fn user_id_of(&self, conn: ConnectionId) -> Option<&str> {
        self.by_connection.get(&conn).map(String::as_str)
    }

    /// Connection currently holding `user_id`, if any.
    #[must_use]
    pub fn connection_of(&self, user_id: &str) -> Option<ConnectionId> {
        self.by_user.get(user_id).copied()
    }

    /// Number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    /// Whether no users are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}
