use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::room_member::{Location, MemberRole, RoomMember};

/// RoomMember repository, backed by the `room_members` table. Kept as a
/// single module (unlike `room`'s create/read/update/delete split) since its
/// surface is smaller: one aggregate root, no multi-statement create path.
pub struct RoomMemberRepository {
    pool: sqlx::PgPool,
}

impl RoomMemberRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn add_participant(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
        now: NaiveDateTime,
    ) -> Result<RoomMember, AppError> {
        sqlx::query_as::<_, RoomMember>(
            r#"
            INSERT INTO room_members (
                room_id, user_id, role, is_connected, in_game, current_location,
                is_ready, socket_id, last_ping, game_data, custom_lobby_name,
                joined_at, left_at
            )
            VALUES ($1, $2, $3, true, false, 'lobby', false, NULL, $4, '{}', NULL, $4, NULL)
            ON CONFLICT (room_id, user_id) DO UPDATE SET
                left_at = NULL, is_connected = true, current_location = 'lobby',
                in_game = false, last_ping = $4
            RETURNING *
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(role)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn find(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<RoomMember>, AppError> {
        sqlx::query_as::<_, RoomMember>(
            "SELECT * FROM room_members WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn list_active(&self, room_id: Uuid) -> Result<Vec<RoomMember>, AppError> {
        sqlx::query_as::<_, RoomMember>(
            "SELECT * FROM room_members WHERE room_id = $1 AND left_at IS NULL ORDER BY joined_at",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// Members still marked connected whose `last_ping` is older than
    /// `cutoff` — candidates for the sweeper to demote to `disconnected`.
    pub async fn find_stale_connected(&self, cutoff: NaiveDateTime) -> Result<Vec<(Uuid, Uuid)>, AppError> {
        sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT room_id, user_id FROM room_members \
             WHERE is_connected = true AND last_ping < $1 AND left_at IS NULL",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn count_active(&self, room_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM room_members WHERE room_id = $1 AND left_at IS NULL",
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// `updatePlayerLocation` / `handleHeartbeat`: single-row location write.
    pub async fn set_location(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        location: Location,
        last_ping: NaiveDateTime,
    ) -> Result<RoomMember, AppError> {
        sqlx::query_as::<_, RoomMember>(
            r#"
            UPDATE room_members
            SET current_location = $3,
                is_connected = $4,
                in_game = $5,
                last_ping = $6
            WHERE room_id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(location)
        .bind(location.is_connected())
        .bind(location.in_game())
        .bind(last_ping)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// `updateRoomMembersBulk`: one statement against `= ANY($2)`, so a
    /// multi-player status sync is one atomic write, not N sequential ones.
    pub async fn bulk_set_location(
        &self,
        room_id: Uuid,
        user_ids: &[Uuid],
        location: Location,
        last_ping: NaiveDateTime,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE room_members
            SET current_location = $3,
                is_connected = $4,
                in_game = $5,
                last_ping = $6
            WHERE room_id = $1 AND user_id = ANY($2)
            "#,
        )
        .bind(room_id)
        .bind(user_ids)
        .bind(location)
        .bind(location.is_connected())
        .bind(location.in_game())
        .bind(last_ping)
        .execute(&self.pool)
        .await
        .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }

    /// `joinRoom`: records the socket attached to this join and the
    /// player-chosen display name, if any, in one write.
    pub async fn set_join_metadata(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        socket_id: Option<String>,
        custom_lobby_name: Option<String>,
    ) -> Result<RoomMember, AppError> {
        sqlx::query_as::<_, RoomMember>(
            r#"
            UPDATE room_members
            SET socket_id = COALESCE($3, socket_id),
                custom_lobby_name = COALESCE($4, custom_lobby_name)
            WHERE room_id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(socket_id)
        .bind(custom_lobby_name)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn set_ready(&self, room_id: Uuid, user_id: Uuid, ready: bool) -> Result<RoomMember, AppError> {
        sqlx::query_as::<_, RoomMember>(
            "UPDATE room_members SET is_ready = $3 WHERE room_id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(ready)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn set_role(&self, room_id: Uuid, user_id: Uuid, role: MemberRole) -> Result<RoomMember, AppError> {
        sqlx::query_as::<_, RoomMember>(
            "UPDATE room_members SET role = $3 WHERE room_id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// `leaveRoom` / `kickPlayer`: soft delete via `left_at`, row kept for
    /// the event log join and any later `player_sessions` audit trail.
    pub async fn mark_left(&self, room_id: Uuid, user_id: Uuid, left_at: NaiveDateTime) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE room_members SET left_at = $3, is_connected = false, current_location = 'disconnected' \
             WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(left_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::SqlxError)?;
        Ok(())
    }

    #[cfg(debug_assertions)]
    pub async fn delete_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM room_members")
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }
}
