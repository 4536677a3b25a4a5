//! Rooms: bounded history and subscriber registry.

mod history;
mod registry;

pub use history::History;
pub use registry::{ConnectionId, EnvelopeSender, RoomRegistry};
