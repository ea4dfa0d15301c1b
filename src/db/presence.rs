use redis::AsyncCommands;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::keys::RedisKey;
use crate::models::presence::Presence;
use crate::models::room_member::Location;
use crate::state::RedisClient;

/// Presence repository, backed by the Redis hash cache described in
/// `models::presence`. Every write here is a cache write: the durable record
/// lives in `room_members` and is reconciled by the status sweeper.
pub struct PresenceRepository {
    redis: RedisClient,
}

impl PresenceRepository {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    pub async fn set(&self, presence: &Presence) -> Result<(), AppError> {
        let mut conn = self
            .redis
            .get()
            .await
            .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
        let key = RedisKey::room_presence(presence.room_id, presence.user_id);
        let hash = presence.to_redis_hash();
        let pairs: Vec<(&String, &String)> = hash.iter().collect();
        let _: () = conn
            .hset_multiple(&key, &pairs)
            .await
            .map_err(AppError::RedisCommandError)?;
        Ok(())
    }

    pub async fn get(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Presence>, AppError> {
        let mut conn = self
            .redis
            .get()
            .await
            .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
        let key = RedisKey::room_presence(room_id, user_id);
        let hash: std::collections::HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(AppError::RedisCommandError)?;
        if hash.is_empty() {
            return Ok(None);
        }
        Presence::from_redis_hash(&hash).map(Some)
    }

    pub async fn remove(&self, room_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let mut conn = self
            .redis
            .get()
            .await
            .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
        let key = RedisKey::room_presence(room_id, user_id);
        let _: () = conn.del(&key).await.map_err(AppError::RedisCommandError)?;
        Ok(())
    }

    /// Rebuilds every member's presence for a room by scanning the cache's
    /// key pattern. Not on any hot path today (Postgres stays authoritative
    /// and is what snapshots read from); kept for an operator inspecting the
    /// cache directly without round-tripping the durable store.
    pub async fn list_for_room(&self, room_id: Uuid) -> Result<Vec<Presence>, AppError> {
        let mut conn = self
            .redis
            .get()
            .await
            .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
        let pattern = RedisKey::room_presence_pattern(room_id);
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(AppError::RedisCommandError)?;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let hash: std::collections::HashMap<String, String> = conn
                .hgetall(&key)
                .await
                .map_err(AppError::RedisCommandError)?;
            if !hash.is_empty() {
                out.push(Presence::from_redis_hash(&hash)?);
            }
        }
        Ok(out)
    }

    /// Sets a member's location on the cache, creating the entry if absent.
    pub async fn set_location(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        location: Location,
    ) -> Result<Presence, AppError> {
        let presence = Presence::now(room_id, user_id, location);
        self.set(&presence).await?;
        Ok(presence)
    }

    /// Cross-process idempotency guard for a status push keyed by
    /// `(roomCode, userId, newLocation, metadata.timestamp)`. The in-process
    /// dedup actually enforcing "process at most once" lives on each
    /// `RoomActor`'s own `seen_dedup_keys` set; this Redis-backed version
    /// would only matter for a multi-instance deployment, which is out of
    /// scope here, so nothing calls it yet. Returns `true` the first time a
    /// given key is seen.
    pub async fn mark_seen_once(
        &self,
        room_code: &str,
        dedup_key: &str,
        ttl_secs: u64,
    ) -> Result<bool, AppError> {
        let mut conn = self
            .redis
            .get()
            .await
            .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
        let set_key = RedisKey::status_dedup(room_code);
        let added: i64 = conn
            .sadd(&set_key, dedup_key)
            .await
            .map_err(AppError::RedisCommandError)?;
        if added == 1 {
            let _: () = conn
                .expire(&set_key, ttl_secs as i64)
                .await
                .map_err(AppError::RedisCommandError)?;
        }
        Ok(added == 1)
    }
}
