//! Domain model structs persisted in the message database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic of the system message recorded when a player enters a lobby.
///
/// A player's first join marker anchors their first-sync cursor.
pub const PLAYER_JOINS_LOBBY: &str = "PLAYER_JOINS_LOBBY";

/// Topic of the system message recorded when a player leaves a lobby.
pub const PLAYER_LEAVES_LOBBY: &str = "PLAYER_LEAVES_LOBBY";

/// Returns `true` for topics that only the lobby service may write.
pub fn is_reserved_topic(topic: &str) -> bool {
    topic == PLAYER_JOINS_LOBBY || topic == PLAYER_LEAVES_LOBBY
}

// ---------------------------------------------------------------------------
// NewMessage
// ---------------------------------------------------------------------------

/// A message as submitted for insertion.
///
/// Carries no `number`: the per-lobby sequence number is assigned by the
/// store inside the inserting transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    /// Client-generated identifier, used as the idempotency key.
    pub id: Uuid,
    /// Lobby the message is posted to.
    pub lobby_id: Uuid,
    /// Author of the message.
    pub player_id: Uuid,
    /// Server-side timestamp of the send.
    pub send_time: DateTime<Utc>,
    /// Short classifier, e.g. `CHAT` or one of the reserved system topics.
    pub topic: String,
    /// Opaque payload defined by the author.
    pub message: serde_json::Value,
}

impl NewMessage {
    /// Join marker for `player_id` entering `lobby_id`.
    pub fn player_joined(lobby_id: Uuid, player_id: Uuid) -> Self {
        Self::system(lobby_id, player_id, PLAYER_JOINS_LOBBY)
    }

    /// Leave marker for `player_id` leaving `lobby_id`.
    pub fn player_left(lobby_id: Uuid, player_id: Uuid) -> Self {
        Self::system(lobby_id, player_id, PLAYER_LEAVES_LOBBY)
    }

    fn system(lobby_id: Uuid, player_id: Uuid, topic: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            lobby_id,
            player_id,
            send_time: Utc::now(),
            topic: topic.to_string(),
            message: serde_json::Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A stored message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub lobby_id: Uuid,
    pub player_id: Uuid,
    pub send_time: DateTime<Utc>,
    /// Per-lobby delivery cursor, strictly increasing and never reused.
    pub number: i64,
    pub topic: String,
    pub message: serde_json::Value,
}
