use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::room::{Room, RoomStatus};
use crate::models::room_member::{Location, MemberRole, RoomMember};

use super::RoomRepository;

impl RoomRepository {
    /// `createRoom` + the host's initial `addParticipant`, wrapped in a single
    /// transaction: both succeed together or neither persists (§4.A).
    pub async fn create_room_with_host(
        &self,
        room_code: &str,
        host_id: Uuid,
        max_players: i16,
        is_public: bool,
        streamer_mode: bool,
    ) -> Result<(Room, RoomMember), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::SqlxError)?;
        let now = Utc::now().naive_utc();

        let room = sqlx::query_as::<_, Room>(
            r#"
            INSERT INTO rooms (
                id, room_code, host_id, status, current_game, max_players,
                is_public, streamer_mode, game_settings, metadata,
                created_at, last_activity, game_started_at
            )
            VALUES ($1, $2, $3, $4, NULL, $5, $6, $7, $8, $9, $10, $10, NULL)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_code)
        .bind(host_id)
        .bind(RoomStatus::Lobby)
        .bind(max_players)
        .bind(is_public)
        .bind(streamer_mode)
        .bind(json!({}))
        .bind(json!({}))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to create room: {e}")))?;

        let member = sqlx::query_as::<_, RoomMember>(
            r#"
            INSERT INTO room_members (
                room_id, user_id, role, is_connected, in_game, current_location,
                is_ready, socket_id, last_ping, game_data, custom_lobby_name,
                joined_at, left_at
            )
            VALUES ($1, $2, $3, true, false, $4, false, NULL, $5, $6, NULL, $5, NULL)
            RETURNING *
            "#,
        )
        .bind(room.id)
        .bind(host_id)
        .bind(MemberRole::Host)
        .bind(Location::Lobby)
        .bind(now)
        .bind(json!({}))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("failed to add host participant: {e}")))?;

        tx.commit().await.map_err(AppError::SqlxError)?;

        tracing::info!(room_code, %host_id, "created room");
        Ok((room, member))
    }
}
