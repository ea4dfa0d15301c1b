use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::room::{Room, RoomStatus};

use super::RoomRepository;

impl RoomRepository {
    pub async fn set_status(&self, id: Uuid, status: RoomStatus) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            "UPDATE rooms SET status = $2, last_activity = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// `selectGame`: sets `current_game`, clearing it is only valid while the
    /// room is still in `lobby` (enforced by the caller, not the query).
    pub async fn set_current_game(
        &self,
        id: Uuid,
        game_id: Option<Uuid>,
    ) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            "UPDATE rooms SET current_game = $2, last_activity = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(game_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// `startGame`: transitions to `in_game` and stamps `game_started_at` in
    /// one write, so the two fields can never observably disagree.
    pub async fn start_game(&self, id: Uuid, started_at: NaiveDateTime) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            r#"
            UPDATE rooms
            SET status = 'in_game', game_started_at = $2, last_activity = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// `startGame`: per-room settings chosen at launch, merged over the
    /// room's stored `game_settings` rather than replacing it wholesale.
    pub async fn set_game_settings(
        &self,
        id: Uuid,
        settings: serde_json::Value,
    ) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            "UPDATE rooms SET game_settings = $2, last_activity = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(settings)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn set_host(&self, id: Uuid, host_id: Uuid) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            "UPDATE rooms SET host_id = $2, last_activity = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(host_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn set_metadata(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            "UPDATE rooms SET metadata = $2, last_activity = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn touch_activity(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE rooms SET last_activity = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(())
    }

    /// `handleGameEnd`'s return-to-lobby write: status back to `lobby`,
    /// `current_game` cleared, `game_started_at` cleared, in a single
    /// statement so no intermediate state is ever observable mid-transition.
    ///
    /// Only `pendingReturn` is stripped here — the return itself has now
    /// happened, so it is no longer "pending". `return_in_progress_until`
    /// deliberately survives this write: it is the grace-window deadline
    /// (§4.D/§4.E) that must keep suppressing stray "disconnected from game"
    /// signals for the rest of the 15s window *after* this transition, not
    /// just up to it. It expires on its own once `return_grace_until()`'s
    /// timestamp comparison falls in the past; nothing needs to clear it.
    pub async fn return_to_lobby(&self, id: Uuid) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>(
            r#"
            UPDATE rooms
            SET status = 'lobby', current_game = NULL, game_started_at = NULL,
                metadata = metadata - 'pendingReturn',
                last_activity = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }
}
