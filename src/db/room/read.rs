use uuid::Uuid;

use crate::errors::AppError;
use crate::models::room::Room;
use crate::models::room_member::RoomMemberWithUser;

use super::RoomRepository;

pub use crate::models::room::RoomWithMembers;

impl RoomRepository {
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Room>, AppError> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn find_by_code(&self, room_code: &str) -> Result<Option<Room>, AppError> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE room_code = $1")
            .bind(room_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    /// `getRoomByCode`: the room plus every member row with its user
    /// projection, eagerly loaded in a single join query (§4.A).
    pub async fn get_room_with_members(
        &self,
        room_code: &str,
    ) -> Result<Option<RoomWithMembers>, AppError> {
        let Some(room) = self.find_by_code(room_code).await? else {
            return Ok(None);
        };

        let members = sqlx::query_as::<_, RoomMemberRow>(
            r#"
            SELECT
                rm.room_id, rm.user_id, rm.role, rm.is_connected, rm.in_game,
                rm.current_location, rm.is_ready, rm.socket_id, rm.last_ping,
                rm.game_data, rm.custom_lobby_name, rm.joined_at, rm.left_at,
                u.id as user_id_proj, u.username, u.display_name, u.avatar_url, u.is_guest
            FROM room_members rm
            JOIN users u ON u.id = rm.user_id
            WHERE rm.room_id = $1 AND rm.left_at IS NULL
            ORDER BY rm.joined_at ASC
            "#,
        )
        .bind(room.id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)?
        .into_iter()
        .map(RoomMemberWithUser::from)
        .collect();

        Ok(Some(RoomWithMembers { room, members }))
    }

    pub async fn exists_by_code(&self, room_code: &str) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM rooms WHERE room_code = $1)")
            .bind(room_code)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn find_public_rooms(&self, limit: i64) -> Result<Vec<Room>, AppError> {
        sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms WHERE is_public = true AND status = 'lobby' \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn find_idle_since(
        &self,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Vec<Room>, AppError> {
        sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms WHERE last_activity < $1 \
             AND status NOT IN ('abandoned', 'finished')",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn count_active(&self) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM rooms WHERE status NOT IN ('abandoned', 'finished')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }
}

#[derive(sqlx::FromRow)]
struct RoomMemberRow {
    room_id: Uuid,
    user_id: Uuid,
    role: crate::models::room_member::MemberRole,
    is_connected: bool,
    in_game: bool,
    current_location: crate::models::room_member::Location,
    is_ready: bool,
    socket_id: Option<String>,
    last_ping: chrono::NaiveDateTime,
    game_data: serde_json::Value,
    custom_lobby_name: Option<String>,
    joined_at: chrono::NaiveDateTime,
    left_at: Option<chrono::NaiveDateTime>,
    user_id_proj: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
    is_guest: bool,
}

impl From<RoomMemberRow> for RoomMemberWithUser {
    fn from(row: RoomMemberRow) -> Self {
        RoomMemberWithUser {
            member: crate::models::room_member::RoomMember {
                room_id: row.room_id,
                user_id: row.user_id,
                role: row.role,
                is_connected: row.is_connected,
                in_game: row.in_game,
                current_location: row.current_location,
                is_ready: row.is_ready,
                socket_id: row.socket_id,
                last_ping: row.last_ping,
                game_data: row.game_data,
                custom_lobby_name: row.custom_lobby_name,
                joined_at: row.joined_at,
                left_at: row.left_at,
            },
            user: crate::models::user::UserSummary {
                id: row.user_id_proj,
                username: row.username,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
                is_guest: row.is_guest,
            },
        }
    }
}
