//! Room registry for the relay server.
//!
//! Maps room ids to their members and message backlog. A room is created
//! empty by `create-room`, populated by `join-room`, and removed as soon as
//! its last member leaves or disconnects.
//!
//! Room entries are ephemeral: lost on relay restart.
//!
//! The registry itself is not synchronized. [`crate::relay::RelayState`]
//! owns it behind a single lock so each event's mutation is atomic.

use std::collections::HashMap;

use roomchat_proto::message::ChatMessage;

use crate::backlog::{Backlog, DEFAULT_BACKLOG_CAPACITY};
use crate::connections::ConnectionId;

/// Errors that can occur during room registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A room with the requested id already exists.
    #[error("Room already exists!")]
    AlreadyExists,
    /// The specified room was not found.
    #[error("Room does not exist!")]
    NotFound,
}

/// A connection participating in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Live connection of the member.
    pub connection_id: ConnectionId,
    /// Display name; not unique and not validated.
    pub username: String,
    /// Persistent user id registered by the connection, if any.
    pub user_id: Option<String>,
}

/// A chat room: ordered members plus a bounded backlog.
#[derive(Debug)]
pub struct Room {
    id: String,
    created_by: ConnectionId,
    members: Vec<Member>,
    backlog: Backlog,
}

impl Room {
    fn new(id: &str, created_by: ConnectionId, backlog_capacity: usize) -> Self {
        Self {
            id: id.to_string(),
            created_by,
            members: Vec::new(),
            backlog: Backlog::with_capacity(backlog_capacity),
        }
    }

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Members in join order.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Display names of the members in join order.
    #[must_use]
    pub fn usernames(&self) -> Vec<String> {
        self.members.iter().map(|m| m.username.clone()).collect()
    }

    /// Retained messages.
    #[must_use]
    pub const fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    /// Whether `conn` is a member.
    #[must_use]
    pub fn has_member(&self, conn: ConnectionId) -> bool {
        self.members.iter().any(|m| m.connection_id == conn)
    }

    /// Connections of every member.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.connection_id).collect()
    }

    /// Connections of every member except `conn`.
    #[must_use]
    pub fn connections_except(&self, conn: ConnectionId) -> Vec<ConnectionId> {
        self.members
            .iter()
            .map(|m| m.connection_id)
            .filter(|c| *c != conn)
            .collect()
    }
}

/// What happened to a room when a connection left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The room became empty and was removed.
    Closed {
        /// Id of the removed room.
        room_id: String,
    },
    /// Members remain and need the updated roster.
    Remaining {
        /// Id of the room.
        room_id: String,
        /// Connections of the remaining members.
        recipients: Vec<ConnectionId>,
        /// Display names of the remaining members.
        usernames: Vec<String>,
    },
}

/// In-memory directory of active rooms.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    backlog_capacity: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry whose rooms retain the default backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backlog_capacity(DEFAULT_BACKLOG_CAPACITY)
    }

    /// Creates an empty registry whose rooms retain `backlog_capacity` messages.
    #[must_use]
    pub fn with_backlog_capacity(backlog_capacity: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            backlog_capacity,
        }
    }

    /// Creates an empty room.
    ///
    /// The id is not validated. `creator` is remembered so the room can be
    /// reaped if its creator leaves before anyone joins.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] if the id is taken; the
    /// existing room is left untouched.
    pub fn create_room(
        &mut self,
        room_id: &str,
        creator: ConnectionId,
    ) -> Result<(), RegistryError> {
        if self.rooms.contains_key(room_id) {
            return Err(RegistryError::AlreadyExists);
        }
        self.rooms.insert(
            room_id.to_string(),
            Room::new(room_id, creator, self.backlog_capacity),
        );
        Ok(())
    }

    /// Adds `member` to a room and returns the room.
    ///
    /// A connection that is already a member keeps its position; its display
    /// name and user id are refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the room does not exist.
    pub fn join_room(&mut self, room_id: &str, member: Member) -> Result<&Room, RegistryError> {
        let room = self.rooms.get_mut(room_id).ok_or(RegistryError::NotFound)?;
        if let Some(existing) = room
            .members
            .iter_mut()
            .find(|m| m.connection_id == member.connection_id)
        {
            *existing = member;
        } else {
            room.members.push(member);
        }
        Ok(&*room)
    }

    /// Appends a message to a room's backlog and returns the room.
    ///
    /// Returns `None` without side effects if the room does not exist.
    pub fn append_message(&mut self, room_id: &str, message: ChatMessage) -> Option<&Room> {
        let room = self.rooms.get_mut(room_id)?;
        room.backlog.push(message);
        Some(&*room)
    }

    /// Removes `conn` from every room it belongs to.
    ///
    /// Rooms left empty are deleted, as are still-empty rooms that `conn`
    /// created. Departures are returned sorted by room id.
    pub fn leave(&mut self, conn: ConnectionId) -> Vec<Departure> {
        let mut departures = Vec::new();

        for room in self.rooms.values_mut() {
            let before = room.members.len();
            room.members.retain(|m| m.connection_id != conn);
            let was_member = room.members.len() != before;

            if room.members.is_empty() && (was_member || room.created_by == conn) {
                departures.push(Departure::Closed {
                    room_id: room.id.clone(),
                });
            } else if was_member {
                departures.push(Departure::Remaining {
                    room_id: room.id.clone(),
                    recipients: room.connections(),
                    usernames: room.usernames(),
                });
            }
        }

        for departure in &departures {
            if let Departure::Closed { room_id } = departure {
                self.rooms.remove(room_id);
            }
        }

        departures.sort_by(|a, b| departure_room(a).cmp(departure_room(b)));
        departures
    }

    /// Returns a room by id.
    #[must_use]
    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Whether a room with `room_id` exists.
    #[must_use]
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Ids of the rooms `conn` is a member of, sorted.
    #[must_use]
    pub fn rooms_of(&self, conn: ConnectionId) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .rooms
            .values()
            .filter(|room| room.has_member(conn))
            .map(Room::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of active rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether there are no active rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn departure_room(departure: &Departure) -> &str {
    match departure {
        Departure::Closed { room_id } | Departure::Remaining { room_id, .. } => room_id,
    }
}
