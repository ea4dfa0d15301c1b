use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Durable XP/level projection, the side-effect target of `/progress/event`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: Uuid,
    pub xp: i64,
    pub level: i32,
    pub games_played: i64,
    pub updated_at: NaiveDateTime,
}

impl UserStats {
    /// Matches the source codebase's leveling curve shape: level grows with
    /// the square root of XP, one level per ~1000 XP at the low end.
    pub fn level_for_xp(xp: i64) -> i32 {
        (1.0 + ((xp as f64) / 1000.0).sqrt()).floor() as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: String,
    pub xp_reward: i64,
}

/// Unique on `(user_id, achievement_id)` — the mechanism behind "at-most-one
/// unlock per event per achievement" (Design Notes).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub user_id: Uuid,
    pub achievement_id: Uuid,
    pub unlocked_at: NaiveDateTime,
}
