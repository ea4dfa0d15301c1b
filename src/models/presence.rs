use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::room_member::Location;

/// Ephemeral per-member presence cache, denormalized into Redis as a hash
/// keyed by `(room_id, user_id)`. Source of truth remains `room_members` in
/// Postgres (per §5: in-memory/cache state is always rebuildable from the
/// durable store); this hash exists only so the Status Sync Manager can
/// absorb a high rate of heartbeat/status writes without round-tripping
/// Postgres on every one, reconciling back via the periodic sweeper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Presence {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub location: Location,
    pub last_ping: NaiveDateTime,
}

impl Presence {
    pub fn to_redis_hash(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("room_id".to_string(), self.room_id.to_string());
        map.insert("user_id".to_string(), self.user_id.to_string());
        map.insert(
            "location".to_string(),
            serde_json::to_string(&self.location).unwrap_or_default(),
        );
        map.insert(
            "last_ping".to_string(),
            self.last_ping.and_utc().timestamp_millis().to_string(),
        );
        map
    }

    pub fn from_redis_hash(data: &HashMap<String, String>) -> Result<Self, AppError> {
        let room_id = data
            .get("room_id")
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AppError::RedisError("missing or invalid room_id".into()))?;
        let user_id = data
            .get("user_id")
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AppError::RedisError("missing or invalid user_id".into()))?;
        let location = data
            .get("location")
            .and_then(|s| serde_json::from_str::<Location>(s).ok())
            .ok_or_else(|| AppError::RedisError("missing or invalid location".into()))?;
        let last_ping = data
            .get("last_ping")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ms| DateTime::from_timestamp_millis(ms))
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| AppError::RedisError("missing or invalid last_ping".into()))?;

        Ok(Self {
            room_id,
            user_id,
            location,
            last_ping,
        })
    }

    pub fn now(room_id: Uuid, user_id: Uuid, location: Location) -> Self {
        Self {
            room_id,
            user_id,
            location,
            last_ping: Utc::now().naive_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_redis_hash() {
        let p = Presence::now(Uuid::new_v4(), Uuid::new_v4(), Location::Game);
        let hash = p.to_redis_hash();
        let back = Presence::from_redis_hash(&hash).unwrap();
        assert_eq!(p.room_id, back.room_id);
        assert_eq!(p.user_id, back.user_id);
        assert_eq!(p.location, back.location);
        assert_eq!(
            p.last_ping.and_utc().timestamp_millis(),
            back.last_ping.and_utc().timestamp_millis()
        );
    }

    #[test]
    fn rejects_missing_fields() {
        let mut map = HashMap::new();
        map.insert("room_id".to_string(), Uuid::new_v4().to_string());
        assert!(Presence::from_redis_hash(&map).is_err());
    }
}
