use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    InGame,
    Returning,
    Abandoned,
    Finished,
}

impl RoomStatus {
    /// `finished` and `abandoned` are both terminal: no further mutation is
    /// expected once a room reaches either (see Design Notes open question).
    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Abandoned | RoomStatus::Finished)
    }

    pub fn accepts_joins(self) -> bool {
        matches!(
            self,
            RoomStatus::Lobby | RoomStatus::InGame | RoomStatus::Returning
        )
    }
}

/// A logical lobby with a short human-typable code and a fixed host.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub room_code: String,
    pub host_id: Uuid,
    pub status: RoomStatus,
    pub current_game: Option<Uuid>,
    pub max_players: i16,
    pub is_public: bool,
    pub streamer_mode: bool,
    pub game_settings: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
    pub game_started_at: Option<NaiveDateTime>,
}

impl Room {
    /// `return_in_progress_until` sidecar, when present, suppresses spurious
    /// disconnect signals arriving during the return-to-lobby grace window.
    pub fn return_grace_until(&self) -> Option<NaiveDateTime> {
        self.metadata
            .get("return_in_progress_until")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.naive_utc())
    }

    pub fn pending_return(&self) -> bool {
        self.metadata
            .get("pendingReturn")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Room-code field visible to non-members when streamer mode is active.
    pub fn public_code(&self, is_member: bool) -> Option<String> {
        if self.streamer_mode && !is_member {
            None
        } else {
            Some(self.room_code.clone())
        }
    }
}

/// A room together with its member rows, as returned by `getRoomByCode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomWithMembers {
    pub room: Room,
    pub members: Vec<crate::models::room_member::RoomMemberWithUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(status: RoomStatus, streamer_mode: bool, metadata: serde_json::Value) -> Room {
        Room {
            id: Uuid::new_v4(),
            room_code: "ABC123".to_string(),
            host_id: Uuid::new_v4(),
            status,
            current_game: None,
            max_players: 8,
            is_public: true,
            streamer_mode,
            game_settings: serde_json::json!({}),
            metadata,
            created_at: chrono::Utc::now().naive_utc(),
            last_activity: chrono::Utc::now().naive_utc(),
            game_started_at: None,
        }
    }

    #[test]
    fn finished_and_abandoned_are_both_terminal() {
        assert!(room(RoomStatus::Finished, false, serde_json::json!({})).status.is_terminal());
        assert!(room(RoomStatus::Abandoned, false, serde_json::json!({})).status.is_terminal());
        assert!(!room(RoomStatus::Lobby, false, serde_json::json!({})).status.is_terminal());
    }

    #[test]
    fn only_terminal_or_in_game_statuses_reject_joins() {
        assert!(room(RoomStatus::Lobby, false, serde_json::json!({})).status.accepts_joins());
        assert!(room(RoomStatus::InGame, false, serde_json::json!({})).status.accepts_joins());
        assert!(!room(RoomStatus::Finished, false, serde_json::json!({})).status.accepts_joins());
    }

    #[test]
    fn streamer_mode_hides_the_code_from_non_members() {
        let r = room(RoomStatus::Lobby, true, serde_json::json!({}));
        assert_eq!(r.public_code(false), None);
        assert_eq!(r.public_code(true), Some("ABC123".to_string()));
    }

    #[test]
    fn non_streamer_room_always_exposes_its_code() {
        let r = room(RoomStatus::Lobby, false, serde_json::json!({}));
        assert_eq!(r.public_code(false), Some("ABC123".to_string()));
    }

    #[test]
    fn pending_return_reads_from_metadata() {
        assert!(room(RoomStatus::Returning, false, serde_json::json!({"pendingReturn": true})).pending_return());
        assert!(!room(RoomStatus::Lobby, false, serde_json::json!({})).pending_return());
    }

    #[test]
    fn return_grace_until_parses_rfc3339_from_metadata() {
        let r = room(
            RoomStatus::Returning,
            false,
            serde_json::json!({"return_in_progress_until": "2026-01-01T00:00:00Z"}),
        );
        assert!(r.return_grace_until().is_some());
        assert!(room(RoomStatus::Lobby, false, serde_json::json!({})).return_grace_until().is_none());
    }
}
