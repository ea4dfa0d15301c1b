use rand::Rng;
use redis::AsyncCommands;

use crate::errors::AppError;
use crate::models::keys::RedisKey;
use crate::state::RedisClient;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;
const MAX_ATTEMPTS: usize = 64;

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Generates a room code by rejection sampling against the live-room set
/// (§6): draw a candidate, check it's not already claimed by a non-abandoned
/// room, retry on collision. The set membership check (and the reservation
/// that follows it) is a Redis `SADD`, so two concurrent callers never both
/// win the same code even though the eventual row lives in Postgres.
pub async fn generate_room_code(redis: &RedisClient) -> Result<String, AppError> {
    let mut conn = redis
        .get()
        .await
        .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
    let set_key = RedisKey::live_room_codes();

    for _ in 0..MAX_ATTEMPTS {
        let candidate = random_code();
        let added: i64 = conn
            .sadd(&set_key, &candidate)
            .await
            .map_err(AppError::RedisCommandError)?;
        if added == 1 {
            return Ok(candidate);
        }
    }

    Err(AppError::ServerError)
}

/// Releases a code from the live-room set once its room becomes
/// `abandoned`/`finished`, so the 6-character space doesn't exhaust under
/// sustained load.
pub async fn release_room_code(redis: &RedisClient, code: &str) -> Result<(), AppError> {
    let mut conn = redis
        .get()
        .await
        .map_err(|e| AppError::RedisPoolError(e.to_string()))?;
    let set_key = RedisKey::live_room_codes();
    let _: () = conn
        .srem(&set_key, code)
        .await
        .map_err(AppError::RedisCommandError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_code_matches_format() {
        let code = random_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
