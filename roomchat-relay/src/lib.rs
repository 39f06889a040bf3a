//! roomchat relay server library.
//!
//! Exposes the relay server for use in tests and embedding. Clients connect
//! over WebSocket, create and join rooms, and exchange messages and typing
//! indicators that the relay fans out to the other members of each room.

pub mod backlog;
pub mod config;
pub mod connections;
pub mod dispatch;
pub mod relay;
pub mod rooms;
