//! WebSocket wire format (§6): `RoomClientMessage` carries the nine
//! client→server event names, `RoomServerMessage` the server→client ones.
//! Both are internally tagged on `type` in `camelCase`, matching the event
//! names verbatim.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::lobby::Snapshot;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomClientMessage {
    CreateRoom {
        host_name: String,
        max_players: i16,
        #[serde(default = "default_true")]
        is_public: bool,
        #[serde(default)]
        streamer_mode: bool,
    },
    JoinRoom {
        room_code: String,
        player_name: String,
    },
    /// Attaches this socket to a room the caller is already a member of
    /// (reconnect / second tab), without mutating membership.
    JoinSocketRoom {
        room_code: String,
    },
    SelectGame {
        room_code: String,
        game_id: Uuid,
    },
    StartGame {
        room_code: String,
        #[serde(default)]
        settings: serde_json::Value,
    },
    LeaveRoom {
        room_code: String,
    },
    PlayerReturnToLobby {
        room_code: String,
    },
    SetReady {
        room_code: String,
        ready: bool,
    },
    TransferHost {
        room_code: String,
        target_id: Uuid,
    },
    KickPlayer {
        room_code: String,
        target_id: Uuid,
        #[serde(default)]
        reason: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomServerMessage {
    RoomCreated { snapshot: Snapshot },
    RoomJoined { snapshot: Snapshot },
    PlayerJoined { snapshot: Snapshot },
    PlayerLeft { snapshot: Snapshot },
    PlayerStatusUpdated { snapshot: Snapshot },
    GameSelected { snapshot: Snapshot },
    GameStarted { snapshot: Snapshot, redirect_url: Option<String> },
    PlayerReturnedToLobby { snapshot: Snapshot },
    HostTransferred { snapshot: Snapshot },
    PlayerKicked { snapshot: Snapshot },
    RoomClosed { snapshot: Snapshot },
    #[serde(rename = "server:return-to-gb")]
    ServerReturnToGb {
        room_code: Option<String>,
        mode: &'static str,
        initiated_at: String,
        reason: String,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl From<AppError> for RoomServerMessage {
    fn from(err: AppError) -> Self {
        let (_, body) = err.to_response();
        Self::Error { code: body.code, message: body.error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_room_defaults_is_public_true_and_streamer_mode_false() {
        let json = r#"{"type":"createRoom","hostName":"Ada","maxPlayers":8}"#;
        let msg: RoomClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            RoomClientMessage::CreateRoom { host_name, max_players, is_public, streamer_mode } => {
                assert_eq!(host_name, "Ada");
                assert_eq!(max_players, 8);
                assert!(is_public);
                assert!(!streamer_mode);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn kick_player_reason_is_optional() {
        let json = r#"{"type":"kickPlayer","roomCode":"ABC123","targetId":"00000000-0000-0000-0000-000000000001"}"#;
        let msg: RoomClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, RoomClientMessage::KickPlayer { reason: None, .. }));
    }

    #[test]
    fn set_ready_parses_the_ready_flag() {
        let json = r#"{"type":"setReady","roomCode":"ABC123","ready":true}"#;
        let msg: RoomClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, RoomClientMessage::SetReady { ready: true, .. }));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let json = r#"{"type":"notARealEvent"}"#;
        assert!(serde_json::from_str::<RoomClientMessage>(json).is_err());
    }

    #[test]
    fn server_message_error_variant_serializes_with_tag() {
        let msg = RoomServerMessage::Error { code: "ROOM_NOT_FOUND", message: "room not found".to_string() };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "ROOM_NOT_FOUND");
    }

    #[test]
    fn app_error_converts_into_a_tagged_error_message() {
        let msg: RoomServerMessage = AppError::WrongGameSession.into();
        match msg {
            RoomServerMessage::Error { code, .. } => assert_eq!(code, "WRONG_GAME_SESSION"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
