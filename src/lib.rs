//! relaychat - room-based chat with an IRC bridge
//!
//! A WebSocket broadcast server with bounded per-room history, and a
//! relay process that bridges one room to an IRC channel.

pub mod bridge;
pub mod config;
pub mod error;
pub mod irc;
pub mod logging;
pub mod protocol;
pub mod room;
pub mod server;

pub use bridge::Bridge;
pub use config::Config;
pub use error::{RelayChatError, Result};
pub use protocol::{ClientEnvelope, Message, ServerEnvelope};
pub use room::RoomRegistry;
pub use server::ChatServer;
