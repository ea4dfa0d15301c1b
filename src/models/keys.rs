use std::fmt;
use uuid::Uuid;

/// Fragment of a Redis key (Id, Str, or Wildcard).
#[derive(Debug, Clone)]
pub enum KeyPart {
    Id(Uuid),
    Str(String),
    Wildcard,
}

impl From<Uuid> for KeyPart {
    fn from(id: Uuid) -> Self {
        KeyPart::Id(id)
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        if s == "*" {
            KeyPart::Wildcard
        } else {
            KeyPart::Str(s.to_string())
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Id(id) => write!(f, "{}", id),
            KeyPart::Str(s) => write!(f, "{}", s),
            KeyPart::Wildcard => write!(f, "*"),
        }
    }
}

/// Helper to build Redis keys consistently.
pub struct RedisKey;

impl RedisKey {
    pub fn build(parts: &[KeyPart]) -> String {
        parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Key for a member's presence hash (pattern: `rooms:{room_id}:presence:{user_id}`).
    pub fn room_presence(room_id: impl Into<KeyPart>, user_id: impl Into<KeyPart>) -> String {
        Self::build(&[
            KeyPart::Str("rooms".to_string()),
            room_id.into(),
            KeyPart::Str("presence".to_string()),
            user_id.into(),
        ])
    }

    /// Pattern matching every presence hash for a room (used by the sweeper
    /// and by `syncRoomStatus` to rebuild a snapshot from the cache).
    pub fn room_presence_pattern(room_id: impl Into<KeyPart>) -> String {
        Self::build(&[
            KeyPart::Str("rooms".to_string()),
            room_id.into(),
            KeyPart::Str("presence".to_string()),
            KeyPart::Wildcard,
        ])
    }

    /// Dedup set for idempotent status pushes, keyed by
    /// `(roomCode, userId, newLocation, metadata.timestamp)`.
    pub fn status_dedup(room_code: &str) -> String {
        Self::build(&[
            KeyPart::Str("rooms".to_string()),
            KeyPart::Str(room_code.to_string()),
            KeyPart::Str("status_dedup".to_string()),
        ])
    }

    /// Rate limiter key, process-wide token bucket keyed by `(service_name, endpoint)`.
    pub fn rate_limit(service_name: &str, endpoint: &str) -> String {
        Self::build(&[
            KeyPart::Str("rate".to_string()),
            KeyPart::Str(service_name.to_string()),
            KeyPart::Str(endpoint.to_string()),
        ])
    }

    /// Live room-code registry (used for rejection sampling against the live set).
    pub fn live_room_codes() -> String {
        "rooms:live_codes".to_string()
    }
}
