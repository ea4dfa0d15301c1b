//! External Game API (§4.F): the HTTP surface consumed by remote game
//! servers. Every handler here is reached only through `GameApiAuth`, so the
//! caller is always a resolved `ApiKey` row, never a player's own session.
//!
//! Authorization is two-layered: `ApiKey::has_permission` gates the
//! *endpoint*, `ApiKey::authorized_for_game` gates the *room* (a key scoped
//! to one game can't touch a room currently hosting a different one). Every
//! handler also spends one token from the process-wide keyed rate limiter
//! before doing any work, per the fail-secure default in §5.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::GameApiAuth;
use crate::db::room::RoomRepository;
use crate::db::stats::StatsRepository;
use crate::errors::AppError;
use crate::lobby::actor::{self, dispatch};
use crate::lobby::snapshot::Snapshot;
use crate::models::api_key::ApiKey;
use crate::models::room::Room;
use crate::models::room_member::Location;
use crate::models::stats::{Achievement, UserStats};
use crate::session;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_room;
use crate::ws::messages::RoomServerMessage;

fn rate_limit_headers(limit: u32) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        limit.to_string().parse().expect("digits are valid header values"),
    );
    headers
}

fn check_rate_limit(state: &AppState, key: &ApiKey, endpoint: &str) -> Result<u32, AppError> {
    state.rate_limiter.check(&key.service_name, endpoint, key.rate_limit)
}

/// Loads the room and checks both the endpoint permission and the
/// game-identity match, in that order, so a key with the wrong permission
/// never leaks whether a room code exists.
async fn authorize_room(
    state: &AppState,
    room_code: &str,
    key: &ApiKey,
    permission: &str,
) -> Result<Room, AppError> {
    if !key.has_permission(permission) {
        return Err(AppError::Forbidden(format!("missing permission: {permission}")));
    }
    let room = RoomRepository::new(state.postgres.clone())
        .find_by_code(room_code)
        .await?
        .ok_or(AppError::RoomNotFound)?;
    if !key.authorized_for_game(room.current_game) {
        return Err(AppError::WrongGameType);
    }
    Ok(room)
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    session_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    snapshot: Snapshot,
    session_valid: Option<bool>,
}

/// `GET /rooms/:code/validate`: a game server confirming a joining player.
/// Returns the current snapshot plus, when a `sessionToken` is supplied,
/// whether that token is currently valid for this key's game.
pub async fn validate_room(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
    Query(query): Query<ValidateQuery>,
    GameApiAuth(key): GameApiAuth,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.validate")?;
    authorize_room(&state, &room_code, &key, "rooms:read").await?;

    let snapshot = dispatch(&state, &room_code, |reply| actor::RoomCommand::SyncRoomStatus { reply }).await?;

    let session_valid = match (query.session_token, key.game_id) {
        (Some(token), Some(game_id)) => Some(session::recover_session(&state, &token, game_id).await.is_ok()),
        _ => None,
    };

    Ok((rate_limit_headers(limit), Json(ValidateResponse { snapshot, session_valid })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPushRequest {
    location: Location,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPushResponse {
    applied: bool,
    snapshot: Option<Snapshot>,
}

/// `POST /rooms/:code/players/:id/status`: single-player status push,
/// idempotent on `(userId, location, timestamp)` via the room actor's dedup set.
pub async fn push_player_status(
    State(state): State<AppState>,
    Path((room_code, user_id)): Path<(String, Uuid)>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<StatusPushRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.status")?;
    authorize_room(&state, &room_code, &key, "rooms:write").await?;

    let snapshot = dispatch(&state, &room_code, |reply| actor::RoomCommand::UpdatePlayerLocation {
        user_id,
        new_location: body.location,
        dedup_timestamp: body.timestamp,
        reply,
    })
    .await?;

    if let Some(snapshot) = &snapshot {
        broadcast_room(&state, &room_code, &RoomServerMessage::PlayerStatusUpdated { snapshot: snapshot.clone() }).await;
    }

    Ok((
        rate_limit_headers(limit),
        Json(StatusPushResponse { applied: snapshot.is_some(), snapshot }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusEntry {
    user_id: Uuid,
    location: Location,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    updates: Vec<BulkStatusEntry>,
    #[serde(default = "default_bulk_reason")]
    reason: String,
    /// Opaque per-room blob (e.g. a mid-game checkpoint); merged into the
    /// room's `metadata.gameState` key rather than threaded through the
    /// room actor, since it's advisory and not part of presence state.
    game_state: Option<serde_json::Value>,
}

fn default_bulk_reason() -> String {
    "external-bulk-status".to_string()
}

/// `POST /rooms/:code/bulk-status`: batched per-player update, atomic with
/// respect to the snapshot it emits.
pub async fn bulk_update_status(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<BulkStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.bulk_status")?;
    let room = authorize_room(&state, &room_code, &key, "rooms:write").await?;

    let updates = body
        .updates
        .into_iter()
        .map(|u| actor::BulkStatusUpdate {
            user_id: u.user_id,
            location: u.location,
            dedup_timestamp: u.timestamp,
        })
        .collect();

    let result = dispatch(&state, &room_code, |reply| actor::RoomCommand::BulkUpdateStatus {
        updates,
        reason: body.reason,
        reply,
    })
    .await?;

    if let Some(game_state) = body.game_state {
        let room_repo = RoomRepository::new(state.postgres.clone());
        let mut metadata = room.metadata.clone();
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("gameState".to_string(), game_state);
        }
        room_repo.set_metadata(room.id, metadata).await?;
    }

    broadcast_room(
        &state,
        &room_code,
        &RoomServerMessage::PlayerStatusUpdated { snapshot: result.snapshot.clone() },
    )
    .await;

    Ok((rate_limit_headers(limit), Json(result)))
}

/// `POST /rooms/:code/players/:id/heartbeat`: liveness, returns `shouldReturn`.
pub async fn player_heartbeat(
    State(state): State<AppState>,
    Path((room_code, user_id)): Path<(String, Uuid)>,
    GameApiAuth(key): GameApiAuth,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.heartbeat")?;
    authorize_room(&state, &room_code, &key, "rooms:write").await?;

    let result = dispatch(&state, &room_code, |reply| actor::RoomCommand::Heartbeat { user_id, reply }).await?;
    Ok((rate_limit_headers(limit), Json(result)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameEndRequest {
    source: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Broadcasts the outcome of a `handleGameEnd` call: the authoritative
/// snapshot to every room member, plus — for streamer-mode rooms — the
/// code-free `server:return-to-gb` event carrying the generic group-return
/// link (scenario S5).
async fn broadcast_game_end(state: &AppState, room_code: &str, result: &actor::GameEndResult, reason: &str) {
    broadcast_room(
        state,
        room_code,
        &RoomServerMessage::PlayerReturnedToLobby { snapshot: result.snapshot.clone() },
    )
    .await;

    if result.snapshot.room.streamer_mode {
        broadcast_room(
            state,
            room_code,
            &RoomServerMessage::ServerReturnToGb {
                room_code: result.snapshot.room.code.clone(),
                mode: "group",
                initiated_at: chrono::Utc::now().to_rfc3339(),
                reason: reason.to_string(),
            },
        )
        .await;
    }
}

/// `POST /rooms/:code/game-end`: the game server's own funnel into
/// `handleGameEnd`, identical in effect to a host-triggered end. Idempotent:
/// a room already `returning`/`lobby` just replays its current snapshot
/// because `handle_game_end` rejects only terminal rooms.
pub async fn game_end(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<GameEndRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.game_end")?;
    authorize_room(&state, &room_code, &key, "rooms:write").await?;

    let source = body.source.unwrap_or_else(|| key.service_name.clone());
    let result = dispatch(&state, &room_code, |reply| actor::RoomCommand::GameEnd {
        source: source.clone(),
        metadata: body.metadata,
        reply,
    })
    .await?;

    broadcast_game_end(&state, &room_code, &result, &source).await;

    Ok((rate_limit_headers(limit), Json(result)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReturnAllRequest {
    reason: Option<String>,
}

/// `POST /rooms/:code/return-all`: external-initiated group return. This is
/// the same funnel as `/game-end` — §4.E names them as the two public
/// entrypoints into the same `handleGameEnd` transition — distinguished only
/// by the `source` tag attached to the resulting event log entry.
pub async fn return_all(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<ReturnAllRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.return_all")?;
    authorize_room(&state, &room_code, &key, "rooms:write").await?;

    let source = format!("external:return-all:{}", key.service_name);
    let reason = body.reason.clone().unwrap_or_else(|| "return_all".to_string());
    let result = dispatch(&state, &room_code, |reply| actor::RoomCommand::GameEnd {
        source: source.clone(),
        metadata: serde_json::json!({ "reason": body.reason }),
        reply,
    })
    .await?;

    broadcast_game_end(&state, &room_code, &result, &reason).await;

    Ok((rate_limit_headers(limit), Json(result)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AbandonRequest {
    reason: Option<String>,
}

/// `POST /rooms/:code/abandon`: the game server reporting its room was
/// destroyed externally. Terminal — every member ends up `disconnected`.
pub async fn abandon_room(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<AbandonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "rooms.abandon")?;
    authorize_room(&state, &room_code, &key, "rooms:write").await?;

    let reason = body.reason.unwrap_or_else(|| "external abandon".to_string());
    let snapshot = dispatch(&state, &room_code, |reply| actor::RoomCommand::Abandon { reason, reply }).await?;
    broadcast_room(&state, &room_code, &RoomServerMessage::RoomClosed { snapshot: snapshot.clone() }).await;
    state.rooms.forget(&room_code).await;
    Ok((rate_limit_headers(limit), Json(snapshot)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverSessionRequest {
    session_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverSessionResponse {
    room_code: Option<String>,
    return_url: String,
    snapshot: Snapshot,
}

/// `POST /sessions/recover`: session-token → room re-entry. Rejects
/// cross-game tokens via `session::recover_session`'s own hijack check
/// (testable property #5).
pub async fn recover_session(
    State(state): State<AppState>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<RecoverSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "sessions.recover")?;
    if !key.has_permission("sessions:recover") {
        return Err(AppError::Forbidden("missing permission: sessions:recover".into()));
    }
    let game_id = key.game_id.ok_or(AppError::WrongGameType)?;

    let player_session = session::recover_session(&state, &body.session_token, game_id).await?;
    let room = RoomRepository::new(state.postgres.clone())
        .find_by_id(player_session.room_id)
        .await?
        .ok_or(AppError::RoomNotFound)?;

    let snapshot = dispatch(&state, &room.room_code, |reply| actor::RoomCommand::SyncRoomStatus { reply }).await?;
    let return_url = session::build_return_url(&state.config.client_url, &room, true);

    Ok((
        rate_limit_headers(limit),
        Json(RecoverSessionResponse {
            room_code: room.public_code(true),
            return_url,
            snapshot,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEventRequest {
    user_id: Uuid,
    #[serde(default)]
    xp_delta: i64,
    #[serde(default)]
    game_completed: bool,
    #[serde(default)]
    achievement_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEventResponse {
    stats: UserStats,
    unlocked_achievements: Vec<Achievement>,
}

/// `POST /progress/event`: XP and achievement ingestion, consolidated into a
/// single call per event so the at-most-one-unlock invariant is enforced by
/// one pass over `achievement_keys` rather than by callers retrying.
pub async fn progress_event(
    State(state): State<AppState>,
    GameApiAuth(key): GameApiAuth,
    Json(body): Json<ProgressEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let limit = check_rate_limit(&state, &key, "progress.event")?;
    if !key.has_permission("progress:write") {
        return Err(AppError::Forbidden("missing permission: progress:write".into()));
    }

    let stats_repo = StatsRepository::new(state.postgres.clone());
    let stats = stats_repo.add_xp(body.user_id, body.xp_delta, body.game_completed).await?;

    let mut unlocked_achievements = Vec::with_capacity(body.achievement_keys.len());
    for achievement_key in &body.achievement_keys {
        let Some(achievement) = stats_repo.find_achievement_by_key(achievement_key).await? else {
            tracing::warn!(achievement_key, "progress event referenced unknown achievement");
            continue;
        };
        if stats_repo.unlock_achievement(body.user_id, achievement.id).await?.is_some() {
            unlocked_achievements.push(achievement);
        }
    }

    Ok((
        rate_limit_headers(limit),
        Json(ProgressEventResponse { stats, unlocked_achievements }),
    ))
}
