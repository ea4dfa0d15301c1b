//! Session Manager (§4.C): opaque resume credentials binding a user (or, in
//! streamer mode, a generic room slot) to a room and a game, so a player can
//! re-enter an external game server without a full identity-provider
//! handshake. `buildReturnUrl` lives here too, per the Design Notes'
//! centralization strategy: this is the single call site that knows whether
//! to embed a room code in an external-facing link.

use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::error::DatabaseError;
use uuid::Uuid;

use crate::db::player_session::PlayerSessionRepository;
use crate::errors::AppError;
use crate::models::player_session::{PlayerSession, SessionStatus};
use crate::models::room::Room;
use crate::state::AppState;

/// 32 bytes of OS-backed randomness, hex-encoded to the 64-character token
/// format named in §6.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// `createPlayerSession`: mints a resume token for `user_id` entering
/// `game_id` inside `room`. Streamer mode doesn't change what's stored here
/// (every real participant still gets their own session); it only changes
/// what `build_return_url` is willing to embed for non-member recipients.
pub async fn create_player_session(
    state: &AppState,
    room: &Room,
    user_id: Uuid,
    game_id: Uuid,
) -> Result<PlayerSession, AppError> {
    create_session_inner(state, room, Some(user_id), game_id).await
}

/// Generic, user-less session for streamer-mode group returns (scenario
/// S5): one shared token that every disconnected spectator-facing link can
/// use to resume into the same room without exposing an individual identity.
pub async fn create_generic_session(
    state: &AppState,
    room: &Room,
    game_id: Uuid,
) -> Result<PlayerSession, AppError> {
    create_session_inner(state, room, None, game_id).await
}

async fn create_session_inner(
    state: &AppState,
    room: &Room,
    user_id: Option<Uuid>,
    game_id: Uuid,
) -> Result<PlayerSession, AppError> {
    let repo = PlayerSessionRepository::new(state.postgres.clone());
    let expires_at =
        Utc::now().naive_utc() + Duration::minutes(state.config.session_timeout_minutes);

    // A unique-index collision on `session_token` is astronomically
    // unlikely with 32 bytes of entropy; retry once rather than fail the
    // caller outright if it ever happens.
    for _ in 0..2 {
        let token = generate_token();
        match repo
            .create(
                &token,
                user_id,
                room.id,
                game_id,
                room.streamer_mode,
                expires_at,
                serde_json::json!({}),
            )
            .await
        {
            Ok(session) => return Ok(session),
            Err(AppError::SqlxError(sqlx::Error::Database(db_err)))
                if db_err.is_unique_violation() =>
            {
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::ServerError)
}

/// `recoverSession` (§4.C): resolves an opaque token back to its room,
/// enforcing the cross-game hijack defense — a session minted for one game
/// can never be redeemed against another game's API key (testable property
/// #5, scenario S4).
pub async fn recover_session(
    state: &AppState,
    token: &str,
    requesting_game_id: Uuid,
) -> Result<PlayerSession, AppError> {
    let repo = PlayerSessionRepository::new(state.postgres.clone());
    let session = repo
        .find_by_token(token)
        .await?
        .ok_or(AppError::InvalidSession)?;

    if !session.is_valid_now() {
        return Err(AppError::InvalidSession);
    }

    if session.game_type != requesting_game_id {
        tracing::warn!(
            session_id = %session.id,
            expected = %session.game_type,
            requested = %requesting_game_id,
            "cross-game session recovery attempt"
        );
        return Err(AppError::WrongGameSession);
    }

    Ok(session)
}

pub async fn revoke_session(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let repo = PlayerSessionRepository::new(state.postgres.clone());
    repo.set_status(id, SessionStatus::Revoked).await?;
    Ok(())
}

/// Single call site for building an external-facing redirect/return URL:
/// embeds the real room code for members, suppresses it behind the
/// streamer-mode rule otherwise (mirrors `Room::public_code`).
pub fn build_return_url(client_url: &str, room: &Room, is_member_recipient: bool) -> String {
    match room.public_code(is_member_recipient) {
        Some(code) => format!("{}/rooms/{}", client_url.trim_end_matches('/'), code),
        None => format!("{}/rooms/joining", client_url.trim_end_matches('/')),
    }
}

/// Builds the generic, room-code-free resume link for a streamer-mode group
/// return (scenario S5): `https://<host>/lobby?session=<token>`, with no
/// room identifier anywhere in the URL.
pub fn build_group_return_url(client_url: &str, token: &str) -> String {
    format!("{}/lobby?session={}", client_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::room::RoomStatus;

    fn room(streamer_mode: bool) -> Room {
        Room {
            id: Uuid::new_v4(),
            room_code: "ZX9Q2P".to_string(),
            host_id: Uuid::new_v4(),
            status: RoomStatus::Lobby,
            current_game: None,
            max_players: 8,
            is_public: true,
            streamer_mode,
            game_settings: serde_json::json!({}),
            metadata: serde_json::json!({}),
            created_at: Utc::now().naive_utc(),
            last_activity: Utc::now().naive_utc(),
            game_started_at: None,
        }
    }

    #[test]
    fn token_is_64_lowercase_hex_characters() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn two_generated_tokens_never_collide() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn return_url_embeds_the_room_code_for_members() {
        let url = build_return_url("https://gamebuddies.io/", &room(false), true);
        assert_eq!(url, "https://gamebuddies.io/rooms/ZX9Q2P");
    }

    #[test]
    fn return_url_suppresses_the_code_in_streamer_mode_for_non_members() {
        let url = build_return_url("https://gamebuddies.io", &room(true), false);
        assert_eq!(url, "https://gamebuddies.io/rooms/joining");
    }

    #[test]
    fn group_return_url_carries_only_the_session_token_no_room_identifier() {
        let url = build_group_return_url("https://gamebuddies.io/", "deadbeef");
        assert_eq!(url, "https://gamebuddies.io/lobby?session=deadbeef");
        assert!(!url.contains("ZX9Q2P"));
    }
}
