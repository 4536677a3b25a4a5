//! Wire envelope types for the chat transport.
//!
//! Every frame exchanged with the broadcast server is a single JSON
//! object tagged by `type`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A chat message as stored in room history and fanned out to
/// subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Room the message was sent to.
    pub room: String,
    /// Display name of the author.
    pub author: String,
    /// Message body.
    pub text: String,
    /// Server-assigned send time, epoch milliseconds.
    pub time: i64,
}

impl Message {
    /// Create a message stamped with the current server time.
    pub fn new(
        room: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            author: author.into(),
            text: text.into(),
            time: Utc::now().timestamp_millis(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Envelopes sent from a client to the broadcast server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEnvelope {
    /// Subscribe to a room.
    Join {
        /// Room name.
        room: String,
    },
    /// Unsubscribe from a room.
    Part {
        /// Room name.
        room: String,
    },
    /// Request the room's retained history.
    History {
        /// Room name.
        room: String,
    },
    /// Send a message, or register a display name if none is bound yet.
    Message {
        /// Room name.
        room: String,
        /// Message body (or the display name, for the first message).
        text: String,
        /// Author override, honored only with `spoof`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        /// Trusted-sender author override flag.
        #[serde(default, skip_serializing_if = "is_false")]
        spoof: bool,
    },
}

impl ClientEnvelope {
    /// A plain message envelope (no author override).
    pub fn message(room: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            room: room.into(),
            text: text.into(),
            author: None,
            spoof: false,
        }
    }

    /// A spoofed message envelope carrying a relayed identity.
    pub fn spoofed(
        room: impl Into<String>,
        text: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self::Message {
            room: room.into(),
            text: text.into(),
            author: Some(author.into()),
            spoof: true,
        }
    }
}

/// Envelopes sent from the broadcast server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEnvelope {
    /// Room history snapshot, oldest first. Sent only to the requester.
    History {
        /// Retained messages, oldest first.
        history: Vec<Message>,
    },
    /// A broadcast chat message.
    Message(Message),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_deserialize() {
        let json = r##"{"type": "join", "room": "#relay"}"##;
        let msg: ClientEnvelope = serde_json::from_str(json).unwrap();
        match msg {
            ClientEnvelope::Join { room } => assert_eq!(room, "#relay"),
            _ => panic!("Expected Join envelope"),
        }
    }

    #[test]
    fn test_part_deserialize() {
        let json = r##"{"type": "part", "room": "#relay"}"##;
        let msg: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientEnvelope::Part { .. }));
    }

    #[test]
    fn test_history_deserialize() {
        let json = r##"{"type": "history", "room": "#relay"}"##;
        let msg: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientEnvelope::History { .. }));
    }

    #[test]
    fn test_message_deserialize_plain() {
        let json = r##"{"type": "message", "room": "#relay", "text": "hello"}"##;
        let msg: ClientEnvelope = serde_json::from_str(json).unwrap();
        match msg {
            ClientEnvelope::Message {
                room,
                text,
                author,
                spoof,
            } => {
                assert_eq!(room, "#relay");
                assert_eq!(text, "hello");
                assert!(author.is_none());
                assert!(!spoof);
            }
            _ => panic!("Expected Message envelope"),
        }
    }

    #[test]
    fn test_message_deserialize_spoofed() {
        let json =
            r##"{"type": "message", "room": "#relay", "text": "hi", "author": "carl", "spoof": true}"##;
        let msg: ClientEnvelope = serde_json::from_str(json).unwrap();
        match msg {
            ClientEnvelope::Message { author, spoof, .. } => {
                assert_eq!(author.as_deref(), Some("carl"));
                assert!(spoof);
            }
            _ => panic!("Expected Message envelope"),
        }
    }

    #[test]
    fn test_message_serialize_skips_empty_override() {
        let msg = ClientEnvelope::message("#relay", "hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(!json.contains("author"));
        assert!(!json.contains("spoof"));
    }

    #[test]
    fn test_message_serialize_spoofed() {
        let msg = ClientEnvelope::spoofed("#relay", "hey there", "carl");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"spoof\":true"));
        assert!(json.contains("\"author\":\"carl\""));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r##"{"type": "shout", "room": "#relay"}"##;
        assert!(serde_json::from_str::<ClientEnvelope>(json).is_err());
    }

    #[test]
    fn test_server_message_serialize() {
        let msg = ServerEnvelope::Message(Message {
            room: "#relay".to_string(),
            author: "alice".to_string(),
            text: "hi".to_string(),
            time: 1700000000000,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"author\":\"alice\""));
        assert!(json.contains("\"time\":1700000000000"));
    }

    #[test]
    fn test_server_history_round_trip() {
        let env = ServerEnvelope::History {
            history: vec![Message {
                room: "#relay".to_string(),
                author: "bob".to_string(),
                text: "yo".to_string(),
                time: 1,
            }],
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"history\""));

        let back: ServerEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_message_new_stamps_time() {
        let msg = Message::new("#relay", "alice", "hi");
        assert!(msg.time > 0);
        assert_eq!(msg.room, "#relay");
    }
}
