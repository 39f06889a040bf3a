//! Event dispatcher: translates inbound client events into registry calls
//! and the outbound events they cause.
//!
//! The dispatcher performs no I/O. Each call returns the list of
//! [`Outbound`] events to deliver, in order; the caller pushes them to the
//! recipients' connections.
//!
//! | Inbound         | Registry            | Outbound                                         |
//! |-----------------|---------------------|--------------------------------------------------|
//! | `register-user` | directory update    | none                                             |
//! | `create-room`   | `create_room`       | ack to caller                                    |
//! | `join-room`     | `join_room`         | ack to caller, roster to room, backlog to caller |
//! | `send-message`  | `append_message`    | message to room except sender                    |
//! | `typing`        | none                | typing name to room except sender                |
//! | `leave-room`    | `leave`             | roster to remaining members                      |
//! | disconnect      | `leave` + directory | roster to remaining members                      |

use roomchat_proto::event::{ClientEvent, ServerEvent};
use roomchat_proto::message::ChatMessage;
use roomchat_proto::room::{Ack, AckRequest, JoinRoom, SendMessage};
use roomchat_proto::typing::TypingState;

use crate::connections::{ConnectionDirectory, ConnectionId};
use crate::rooms::{Departure, Member, RoomRegistry};

/// One event addressed to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipient connection.
    pub to: ConnectionId,
    /// Event to deliver.
    pub event: ServerEvent,
}

impl Outbound {
    const fn new(to: ConnectionId, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

/// Owns the relay's mutable state and routes events through it.
#[derive(Debug, Default)]
pub struct Dispatcher {
    rooms: RoomRegistry,
    connections: ConnectionDirectory,
}

impl Dispatcher {
    /// Creates a dispatcher whose rooms retain the default backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher whose rooms retain `backlog_capacity` messages.
    #[must_use]
    pub fn with_backlog_capacity(backlog_capacity: usize) -> Self {
        Self {
            rooms: RoomRegistry::with_backlog_capacity(backlog_capacity),
            connections: ConnectionDirectory::new(),
        }
    }

    /// Read access to the room registry.
    #[must_use]
    pub const fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Read access to the user directory.
    #[must_use]
    pub const fn connections(&self) -> &ConnectionDirectory {
        &self.connections
    }

    /// Applies one inbound event from `from` and returns what to deliver.
    pub fn dispatch(&mut self, from: ConnectionId, event: ClientEvent) -> Vec<Outbound> {
        tracing::debug!(conn = %from, event = event.name(), "dispatching event");
        match event {
            ClientEvent::RegisterUser(user_id) => {
                self.register_user(from, &user_id);
                Vec::new()
            }
            ClientEvent::CreateRoom(room_id) => self.create_room(from, &room_id),
            ClientEvent::JoinRoom(join) => self.join_room(from, join),
            ClientEvent::SendMessage(send) => self.send_message(from, send),
            ClientEvent::Typing(state) => self.typing(from, state),
            ClientEvent::LeaveRoom => self.leave(from),
        }
    }

    /// Cleans up after a closed connection and returns what to deliver.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let outbound = self.leave(conn);
        if let Some(user_id) = self.connections.remove(conn) {
            tracing::info!(conn = %conn, user_id = %user_id, "user unregistered");
        }
        outbound
    }

    fn register_user(&mut self, conn: ConnectionId, user_id: &str) {
        if let Some(previous) = self.connections.register(conn, user_id) {
            tracing::info!(
                conn = %conn,
                previous = %previous,
                user_id = %user_id,
                "user moved to new connection"
            );
        } else {
            tracing::info!(conn = %conn, user_id = %user_id, "user registered");
        }
    }

    fn create_room(&mut self, from: ConnectionId, room_id: &str) -> Vec<Outbound> {
        let ack = match self.rooms.create_room(room_id, from) {
            Ok(()) => {
                tracing::info!(conn = %from, room_id = %room_id, "room created");
                Ack::ok(AckRequest::CreateRoom)
            }
            Err(e) => {
                tracing::debug!(conn = %from, room_id = %room_id, error = %e, "room creation rejected");
                Ack::failed(AckRequest::CreateRoom, e.to_string())
            }
        };
        vec![Outbound::new(from, ServerEvent::Ack(ack))]
    }

    fn join_room(&mut self, from: ConnectionId, join: JoinRoom) -> Vec<Outbound> {
        let member = Member {
            connection_id: from,
            username: join.username,
            user_id: self.connections.user_id_of(from).map(str::to_string),
        };

        let room = match self.rooms.join_room(&join.room_id, member) {
            Ok(room) => room,
            Err(e) => {
                tracing::debug!(conn = %from, room_id = %join.room_id, error = %e, "join rejected");
                let ack = Ack::failed(AckRequest::JoinRoom, e.to_string());
                return vec![Outbound::new(from, ServerEvent::Ack(ack))];
            }
        };

        tracing::info!(
            conn = %from,
            room_id = %room.id(),
            members = room.members().len(),
            "member joined"
        );

        let mut outbound = vec![Outbound::new(
            from,
            ServerEvent::Ack(Ack::ok(AckRequest::JoinRoom)),
        )];
        let roster = room.usernames();
        outbound.extend(
            room.connections()
                .into_iter()
                .map(|to| Outbound::new(to, ServerEvent::UpdateUsers(roster.clone()))),
        );
        outbound.push(Outbound::new(
            from,
            ServerEvent::PreviousMessages(room.backlog().snapshot()),
        ));
        outbound
    }

    fn send_message(&mut self, from: ConnectionId, send: SendMessage) -> Vec<Outbound> {
        let message = ChatMessage {
            username: send.username,
            message: send.message,
            timestamp: send.timestamp,
        };
        let Some(room) = self.rooms.append_message(&send.room_id, message.clone()) else {
            tracing::debug!(conn = %from, room_id = %send.room_id, "message for unknown room dropped");
            return Vec::new();
        };

        room.connections_except(from)
            .into_iter()
            .map(|to| Outbound::new(to, ServerEvent::ReceiveMessage(message.clone())))
            .collect()
    }

    fn typing(&self, from: ConnectionId, state: TypingState) -> Vec<Outbound> {
        let Some(room) = self.rooms.get(&state.room_id) else {
            return Vec::new();
        };

        room.connections_except(from)
            .into_iter()
            .map(|to| {
                let event = if state.typing {
                    ServerEvent::UserTyping(state.username.clone())
                } else {
                    ServerEvent::UserStoppedTyping(state.username.clone())
                };
                Outbound::new(to, event)
            })
            .collect()
    }

    fn leave(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for departure in self.rooms.leave(conn) {
            match departure {
                Departure::Closed { room_id } => {
                    tracing::info!(conn = %conn, room_id = %room_id, "room deleted");
                }
                Departure::Remaining {
                    room_id,
                    recipients,
                    usernames,
                } => {
                    tracing::debug!(conn = %conn, room_id = %room_id, "member left");
                    outbound.extend(recipients.into_iter().map(|to| {
                        Outbound::new(to, ServerEvent::UpdateUsers(usernames.clone()))
                    }));
                }
            }
        }
        outbound
    }
}
