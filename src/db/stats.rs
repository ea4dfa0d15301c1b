use uuid::Uuid;

use crate::errors::AppError;
use crate::models::stats::{Achievement, UserAchievement, UserStats};

/// Stats repository, backed by `user_stats`, `achievements`, and
/// `user_achievements`. Backs `/progress/event` ingestion from game servers.
pub struct StatsRepository {
    pool: sqlx::PgPool,
}

impl StatsRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<UserStats>, AppError> {
        sqlx::query_as::<_, UserStats>("SELECT * FROM user_stats WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    /// Adds `xp_delta` and recomputes level, incrementing `games_played` by
    /// one when `game_completed` is set. A single upsert, so concurrent
    /// progress events for the same user serialize through Postgres's own
    /// row lock rather than racing on a read-modify-write from this process.
    pub async fn add_xp(
        &self,
        user_id: Uuid,
        xp_delta: i64,
        game_completed: bool,
    ) -> Result<UserStats, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::SqlxError)?;

        let row = sqlx::query_as::<_, UserStats>(
            r#"
            INSERT INTO user_stats (user_id, xp, level, games_played, updated_at)
            VALUES ($1, GREATEST($2, 0), 1, $3, now())
            ON CONFLICT (user_id) DO UPDATE SET
                xp = GREATEST(user_stats.xp + $2, 0),
                games_played = user_stats.games_played + $3,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(xp_delta)
        .bind(i64::from(game_completed))
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::SqlxError)?;

        let level = UserStats::level_for_xp(row.xp);
        let row = sqlx::query_as::<_, UserStats>(
            "UPDATE user_stats SET level = $2 WHERE user_id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(level)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::SqlxError)?;

        tx.commit().await.map_err(AppError::SqlxError)?;
        Ok(row)
    }

    pub async fn find_achievement_by_key(&self, key: &str) -> Result<Option<Achievement>, AppError> {
        sqlx::query_as::<_, Achievement>("SELECT * FROM achievements WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    /// At-most-one unlock per `(user_id, achievement_id)`, enforced by the
    /// table's unique constraint: a duplicate unlock attempt is silently a
    /// no-op rather than an error.
    pub async fn unlock_achievement(
        &self,
        user_id: Uuid,
        achievement_id: Uuid,
    ) -> Result<Option<UserAchievement>, AppError> {
        sqlx::query_as::<_, UserAchievement>(
            r#"
            INSERT INTO user_achievements (user_id, achievement_id, unlocked_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id, achievement_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(achievement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn list_achievements_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserAchievement>, AppError> {
        sqlx::query_as::<_, UserAchievement>(
            "SELECT * FROM user_achievements WHERE user_id = $1 ORDER BY unlocked_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }
}
