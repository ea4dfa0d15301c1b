use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::player_session::{PlayerSession, SessionStatus};

/// PlayerSession repository, backed by `player_sessions`. The session token
/// column carries a unique index; callers treat a conflict as "generate a
/// new token and retry" rather than surfacing it.
pub struct PlayerSessionRepository {
    pool: sqlx::PgPool,
}

impl PlayerSessionRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        session_token: &str,
        user_id: Option<Uuid>,
        room_id: Uuid,
        game_type: Uuid,
        streamer_mode: bool,
        expires_at: NaiveDateTime,
        metadata: serde_json::Value,
    ) -> Result<PlayerSession, AppError> {
        sqlx::query_as::<_, PlayerSession>(
            r#"
            INSERT INTO player_sessions (
                id, session_token, user_id, room_id, game_type, streamer_mode,
                status, expires_at, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_token)
        .bind(user_id)
        .bind(room_id)
        .bind(game_type)
        .bind(streamer_mode)
        .bind(SessionStatus::Active)
        .bind(expires_at)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<PlayerSession>, AppError> {
        sqlx::query_as::<_, PlayerSession>("SELECT * FROM player_sessions WHERE session_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<PlayerSession, AppError> {
        sqlx::query_as::<_, PlayerSession>(
            "UPDATE player_sessions SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn revoke_all_for_room(&self, room_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE player_sessions SET status = 'revoked' WHERE room_id = $1 AND status = 'active'",
        )
        .bind(room_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }

    /// Retention sweep: `player_sessions` rows outlive their `expires_at` for
    /// audit purposes per the open question in the Design Notes, but are
    /// reclaimed once both expired and past the retention window.
    pub async fn delete_expired_before(&self, cutoff: NaiveDateTime) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM player_sessions WHERE expires_at < $1 AND status != 'active'",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }

    #[cfg(debug_assertions)]
    pub async fn delete_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM player_sessions")
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }
}
