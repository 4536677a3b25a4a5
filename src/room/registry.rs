//! Room registry: subscriber sets and bounded history.
//!
//! The registry is the only state shared across connections. All
//! mutation goes through its operations; callers never hold references
//! to internal structures across calls.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::history::History;
use crate::protocol::{Message, ServerEnvelope};

/// Identifier for a live transport connection.
pub type ConnectionId = u64;

/// Outbound delivery queue handle for one connection.
pub type EnvelopeSender = mpsc::UnboundedSender<ServerEnvelope>;

/// One fan-out target in a room.
struct Subscriber {
    id: ConnectionId,
    sender: EnvelopeSender,
}

/// A room: bounded history plus the join-ordered subscriber list.
struct Room {
    history: History,
    subscribers: Vec<Subscriber>,
}

impl Room {
    fn new(history_size: usize) -> Self {
        Self {
            history: History::new(history_size),
            subscribers: Vec::new(),
        }
    }
}

/// Registry of rooms, shared by all connections.
///
/// Rooms are created lazily on first reference and persist for the
/// process lifetime: history must survive a room being temporarily
/// empty.
pub struct RoomRegistry {
    history_size: usize,
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    /// Create a registry retaining up to `history_size` messages per room.
    pub fn new(history_size: usize) -> Self {
        Self {
            history_size,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Get-or-create a room. Idempotent.
    pub async fn ensure(&self, room: &str) {
        let mut rooms = self.rooms.write().await;
        self.ensure_locked(&mut rooms, room);
    }

    fn ensure_locked<'a>(
        &self,
        rooms: &'a mut HashMap<String, Room>,
        room: &str,
    ) -> &'a mut Room {
        rooms
            .entry(room.to_string())
            .or_insert_with(|| Room::new(self.history_size))
    }

    /// Add a connection to a room's subscriber set.
    ///
    /// No-op if the connection is already subscribed.
    pub async fn join(&self, room: &str, id: ConnectionId, sender: EnvelopeSender) {
        let mut rooms = self.rooms.write().await;
        let entry = self.ensure_locked(&mut rooms, room);
        if entry.subscribers.iter().any(|s| s.id == id) {
            return;
        }
        entry.subscribers.push(Subscriber { id, sender });
    }

    /// Remove a connection from a room's subscriber set.
    ///
    /// A part with no matching join is a no-op.
    pub async fn part(&self, room: &str, id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(entry) = rooms.get_mut(room) {
            entry.subscribers.retain(|s| s.id != id);
        }
    }

    /// Remove a connection from every room it has joined.
    ///
    /// Called when a transport closes; idempotent.
    pub async fn part_all(&self, id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        for entry in rooms.values_mut() {
            entry.subscribers.retain(|s| s.id != id);
        }
    }

    /// Append a message to a room's history.
    ///
    /// Stamps the server send time and evicts the oldest entry beyond
    /// capacity. Returns the stored message.
    pub async fn append(&self, room: &str, author: &str, text: &str) -> Message {
        let mut rooms = self.rooms.write().await;
        let entry = self.ensure_locked(&mut rooms, room);
        Self::append_locked(entry, room, author, text)
    }

    fn append_locked(entry: &mut Room, room: &str, author: &str, text: &str) -> Message {
        let message = Message::new(room, author, text);
        entry.history.push(message.clone());
        message
    }

    /// Append a message and fan it out to every current subscriber,
    /// including the sender.
    ///
    /// Append and fan-out happen in one critical section, so broadcast
    /// order equals append order for any given room. Each delivery is
    /// fire-and-forget: a dead subscriber queue is logged and skipped,
    /// never propagated.
    pub async fn publish(&self, room: &str, author: &str, text: &str) -> Message {
        let mut rooms = self.rooms.write().await;
        let entry = self.ensure_locked(&mut rooms, room);
        let message = Self::append_locked(entry, room, author, text);

        for subscriber in &entry.subscribers {
            if subscriber
                .sender
                .send(ServerEnvelope::Message(message.clone()))
                .is_err()
            {
                debug!(
                    "Dropping broadcast to closed connection {} in {}",
                    subscriber.id, room
                );
            }
        }

        message
    }

    /// Oldest-first copy of a room's retained history.
    pub async fn history_snapshot(&self, room: &str) -> Vec<Message> {
        let mut rooms = self.rooms.write().await;
        self.ensure_locked(&mut rooms, room).history.snapshot()
    }

    /// Current fan-out targets for a room, in join order.
    pub async fn subscribers(&self, room: &str) -> Vec<ConnectionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|r| r.subscribers.iter().map(|s| s.id).collect())
            .unwrap_or_default()
    }

    /// Number of rooms created so far.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of subscribers in a room.
    pub async fn subscriber_count(&self, room: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|r| r.subscribers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let registry = RoomRegistry::new(10);
        registry.ensure("#relay").await;
        registry.ensure("#relay").await;
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_and_part() {
        let registry = RoomRegistry::new(10);
        let (tx, _rx) = unbounded_channel();

        registry.join("#relay", 1, tx).await;
        assert_eq!(registry.subscribers("#relay").await, vec![1]);

        registry.part("#relay", 1).await;
        assert!(registry.subscribers("#relay").await.is_empty());
    }

    #[tokio::test]
    async fn test_double_join_single_part_leaves_subscribed() {
        let registry = RoomRegistry::new(10);
        let (tx, _rx) = unbounded_channel();

        registry.join("#relay", 1, tx.clone()).await;
        registry.join("#relay", 1, tx).await;
        assert_eq!(registry.subscriber_count("#relay").await, 1);

        registry.part("#relay", 1).await;
        assert_eq!(registry.subscriber_count("#relay").await, 0);
    }

    #[tokio::test]
    async fn test_part_without_join_is_noop() {
        let registry = RoomRegistry::new(10);
        registry.part("#relay", 42).await;
        registry.ensure("#relay").await;
        registry.part("#relay", 42).await;
        assert_eq!(registry.subscriber_count("#relay").await, 0);
    }

    #[tokio::test]
    async fn test_subscribers_in_join_order() {
        let registry = RoomRegistry::new(10);
        let (tx, _rx) = unbounded_channel();

        registry.join("#relay", 3, tx.clone()).await;
        registry.join("#relay", 1, tx.clone()).await;
        registry.join("#relay", 2, tx).await;
        assert_eq!(registry.subscribers("#relay").await, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_part_all() {
        let registry = RoomRegistry::new(10);
        let (tx, _rx) = unbounded_channel();

        registry.join("#a", 1, tx.clone()).await;
        registry.join("#b", 1, tx.clone()).await;
        registry.join("#b", 2, tx).await;

        registry.part_all(1).await;
        assert!(registry.subscribers("#a").await.is_empty());
        assert_eq!(registry.subscribers("#b").await, vec![2]);
    }

    #[tokio::test]
    async fn test_append_evicts_fifo() {
        let registry = RoomRegistry::new(2);
        registry.append("#relay", "alice", "hi").await;
        registry.append("#relay", "bob", "yo").await;
        registry.append("#relay", "alice", "again").await;

        let history = registry.history_snapshot("#relay").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].author, "bob");
        assert_eq!(history[0].text, "yo");
        assert_eq!(history[1].author, "alice");
        assert_eq!(history[1].text, "again");
    }

    #[tokio::test]
    async fn test_append_returns_stamped_message() {
        let registry = RoomRegistry::new(10);
        let message = registry.append("#relay", "alice", "hi").await;
        assert_eq!(message.room, "#relay");
        assert_eq!(message.author, "alice");
        assert!(message.time > 0);
    }

    #[tokio::test]
    async fn test_history_snapshot_excludes_later_appends() {
        let registry = RoomRegistry::new(10);
        registry.append("#relay", "alice", "one").await;
        let snapshot = registry.history_snapshot("#relay").await;

        registry.append("#relay", "bob", "two").await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.history_snapshot("#relay").await.len(), 2);
    }

    #[tokio::test]
    async fn test_history_for_unknown_room_is_empty() {
        let registry = RoomRegistry::new(10);
        assert!(registry.history_snapshot("#nowhere").await.is_empty());
        // The lookup created the room
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_all_subscribers() {
        let registry = RoomRegistry::new(10);
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        registry.join("#relay", 1, tx1).await;
        registry.join("#relay", 2, tx2).await;

        registry.publish("#relay", "alice", "hello").await;

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ServerEnvelope::Message(m) => {
                    assert_eq!(m.author, "alice");
                    assert_eq!(m.text, "hello");
                }
                other => panic!("Expected message envelope, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_join_still_appends() {
        let registry = RoomRegistry::new(10);
        registry.publish("#relay", "alice", "hello").await;
        assert_eq!(registry.history_snapshot("#relay").await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_survives_closed_subscriber() {
        let registry = RoomRegistry::new(10);
        let (tx_dead, rx_dead) = unbounded_channel();
        let (tx_live, mut rx_live) = unbounded_channel();

        registry.join("#relay", 1, tx_dead).await;
        registry.join("#relay", 2, tx_live).await;
        drop(rx_dead);

        registry.publish("#relay", "alice", "hello").await;

        // Delivery to the live subscriber is unaffected
        let env = rx_live.recv().await.unwrap();
        assert!(matches!(env, ServerEnvelope::Message(_)));
    }

    #[tokio::test]
    async fn test_rooms_persist_when_empty() {
        let registry = RoomRegistry::new(10);
        let (tx, _rx) = unbounded_channel();

        registry.join("#relay", 1, tx).await;
        registry.publish("#relay", "alice", "hello").await;
        registry.part("#relay", 1).await;

        // History survives the room being empty
        assert_eq!(registry.history_snapshot("#relay").await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_cross_room_leak() {
        let registry = RoomRegistry::new(10);
        let (tx, mut rx) = unbounded_channel();

        registry.join("#a", 1, tx).await;
        registry.publish("#b", "alice", "hello").await;

        assert!(rx.try_recv().is_err());
        assert!(registry.history_snapshot("#a").await.is_empty());
        assert_eq!(registry.history_snapshot("#b").await.len(), 1);
    }
}
