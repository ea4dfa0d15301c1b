use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use super::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Host,
    Player,
    Spectator,
}

/// Presence as a tagged sum, per the Design Notes: one fact, one source of
/// truth. `is_connected`/`in_game`/`current_location` columns are a
/// denormalized projection of this, always written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Lobby,
    Game,
    Disconnected,
}

impl Location {
    pub fn is_connected(self) -> bool {
        !matches!(self, Location::Disconnected)
    }

    pub fn in_game(self) -> bool {
        matches!(self, Location::Game)
    }
}

/// A user's participation in a specific room; distinct from the user entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub is_connected: bool,
    pub in_game: bool,
    pub current_location: Location,
    pub is_ready: bool,
    pub socket_id: Option<String>,
    pub last_ping: NaiveDateTime,
    pub game_data: serde_json::Value,
    pub custom_lobby_name: Option<String>,
    pub joined_at: NaiveDateTime,
    pub left_at: Option<NaiveDateTime>,
}

impl RoomMember {
    /// Enforces the invariant `current_location = disconnected ⇔ is_connected = false`
    /// and `in_game ⇒ current_location = game`, by deriving the booleans from
    /// the single tagged-sum fact rather than setting them independently.
    pub fn apply_location(&mut self, location: Location, last_ping: NaiveDateTime) {
        self.current_location = location;
        self.is_connected = location.is_connected();
        self.in_game = location.in_game();
        self.last_ping = last_ping;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMemberWithUser {
    #[serde(flatten)]
    pub member: RoomMember,
    pub user: UserSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> RoomMember {
        RoomMember {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: MemberRole::Player,
            is_connected: true,
            in_game: false,
            current_location: Location::Lobby,
            is_ready: false,
            socket_id: None,
            last_ping: chrono::Utc::now().naive_utc(),
            game_data: serde_json::json!({}),
            custom_lobby_name: None,
            joined_at: chrono::Utc::now().naive_utc(),
            left_at: None,
        }
    }

    #[test]
    fn disconnected_location_clears_both_booleans() {
        let mut m = member();
        m.apply_location(Location::Disconnected, chrono::Utc::now().naive_utc());
        assert!(!m.is_connected);
        assert!(!m.in_game);
        assert_eq!(m.current_location, Location::Disconnected);
    }

    #[test]
    fn game_location_is_connected_and_in_game() {
        let mut m = member();
        m.apply_location(Location::Game, chrono::Utc::now().naive_utc());
        assert!(m.is_connected);
        assert!(m.in_game);
    }

    #[test]
    fn lobby_location_is_connected_but_not_in_game() {
        let mut m = member();
        m.apply_location(Location::Lobby, chrono::Utc::now().naive_utc());
        assert!(m.is_connected);
        assert!(!m.in_game);
    }
}
