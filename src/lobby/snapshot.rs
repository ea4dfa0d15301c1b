use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::models::room::{Room, RoomStatus};
use crate::models::room_member::{Location, RoomMemberWithUser};

/// A single member's projection inside a `playerStatusUpdated` snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshotInfo {
    pub id: Uuid,
    pub name: String,
    pub is_host: bool,
    pub is_connected: bool,
    pub in_game: bool,
    pub is_ready: bool,
    pub current_location: Location,
    pub last_ping: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshotInfo {
    pub code: Option<String>,
    pub status: RoomStatus,
    pub current_game: Option<Uuid>,
    pub streamer_mode: bool,
    pub max_players: i16,
    pub metadata: serde_json::Value,
}

/// Authoritative room-state message, `playerStatusUpdated` (§4.E). Clients
/// discard any `room_version` lower than the last one observed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub reason: String,
    pub room_version: i64,
    pub source: String,
    pub room: RoomSnapshotInfo,
    pub players: Vec<PlayerSnapshotInfo>,
}

impl Snapshot {
    pub fn build(
        room: &Room,
        members: &[RoomMemberWithUser],
        reason: impl Into<String>,
        source: impl Into<String>,
        room_version: i64,
        is_member_recipient: bool,
    ) -> Self {
        let players = members
            .iter()
            .map(|m| PlayerSnapshotInfo {
                id: m.user.id,
                name: m
                    .member
                    .custom_lobby_name
                    .clone()
                    .unwrap_or_else(|| m.user.display_name.clone()),
                is_host: matches!(m.member.role, crate::models::room_member::MemberRole::Host),
                is_connected: m.member.is_connected,
                in_game: m.member.in_game,
                is_ready: m.member.is_ready,
                current_location: m.member.current_location,
                last_ping: m.member.last_ping,
            })
            .collect();

        Snapshot {
            reason: reason.into(),
            room_version,
            source: source.into(),
            room: RoomSnapshotInfo {
                code: room.public_code(is_member_recipient),
                status: room.status,
                current_game: room.current_game,
                streamer_mode: room.streamer_mode,
                max_players: room.max_players,
                metadata: room.metadata.clone(),
            },
            players,
        }
    }
}

/// Monotonic room-version generator: epoch milliseconds, bumped by at least
/// one on every call so consecutive versions for a room are strictly
/// increasing even when two calls land in the same millisecond
/// (testable property #3).
pub struct VersionClock {
    last: i64,
}

impl VersionClock {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    pub fn next(&mut self, now_ms: i64) -> i64 {
        let v = now_ms.max(self.last + 1);
        self.last = v;
        v
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::room_member::{MemberRole, RoomMemberWithUser};
    use crate::models::user::{PremiumTier, User, UserRole, UserSummary};
    use chrono::Utc;

    #[test]
    fn version_clock_is_strictly_increasing_even_for_equal_inputs() {
        let mut clock = VersionClock::new();
        let a = clock.next(1000);
        let b = clock.next(1000);
        let c = clock.next(999);
        assert!(a < b);
        assert!(b < c);
    }

    fn room() -> Room {
        Room {
            id: Uuid::new_v4(),
            room_code: "R00001".to_string(),
            host_id: Uuid::new_v4(),
            status: RoomStatus::Lobby,
            current_game: None,
            max_players: 4,
            is_public: true,
            streamer_mode: false,
            game_settings: serde_json::json!({}),
            metadata: serde_json::json!({}),
            created_at: Utc::now().naive_utc(),
            last_activity: Utc::now().naive_utc(),
            game_started_at: None,
        }
    }

    fn member(room_id: Uuid, user_id: Uuid, role: MemberRole, is_ready: bool) -> RoomMemberWithUser {
        let user = User {
            id: user_id,
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
            role: UserRole::User,
            is_guest: false,
            premium_tier: PremiumTier::Free,
            xp: 0,
            level: 1,
            last_seen: Utc::now().naive_utc(),
            created_at: Utc::now().naive_utc(),
        };
        RoomMemberWithUser {
            member: crate::models::room_member::RoomMember {
                room_id,
                user_id,
                role,
                is_connected: true,
                in_game: false,
                current_location: Location::Lobby,
                is_ready,
                socket_id: None,
                last_ping: Utc::now().naive_utc(),
                game_data: serde_json::json!({}),
                custom_lobby_name: None,
                joined_at: Utc::now().naive_utc(),
                left_at: None,
            },
            user: UserSummary::from(&user),
        }
    }

    #[test]
    fn snapshot_build_projects_is_ready_per_player() {
        let room = room();
        let members = vec![member(room.id, Uuid::new_v4(), MemberRole::Host, true)];
        let snapshot = Snapshot::build(&room, &members, "roomCreated", "host", 1, true);
        assert!(snapshot.players[0].is_ready);
        assert!(snapshot.players[0].is_host);
    }

    #[test]
    fn snapshot_build_suppresses_room_code_for_streamer_mode_non_members() {
        let mut room = room();
        room.streamer_mode = true;
        let members = vec![member(room.id, Uuid::new_v4(), MemberRole::Player, false)];
        let snapshot = Snapshot::build(&room, &members, "playerJoined", "player", 2, false);
        assert!(snapshot.room.code.is_none());
    }
}
