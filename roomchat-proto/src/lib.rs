//! Shared protocol definitions for the roomchat wire format.

pub mod event;
pub mod message;
pub mod room;
pub mod typing;
