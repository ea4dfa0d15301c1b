//! Lobby Manager (§4.D) and Status Sync Manager (§4.E) business logic.
//!
//! Every function here assumes single-writer discipline: it is called
//! exclusively from the room's `RoomActor` (or, for `create_room`, before any
//! actor for the room exists), never concurrently against the same room.
//! None of these functions take a lock beyond what the repository layer
//! needs — the actor's mailbox is the only serialization primitive.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::event_log::EventLogRepository;
use crate::db::game::GameRepository;
use crate::db::room::RoomRepository;
use crate::db::room_member::RoomMemberRepository;
use crate::errors::AppError;
use crate::lobby::actor::{
    BulkStatusUpdate, BulkUpdateResult, GameEndResult, HeartbeatResult, PerPlayerResult, StartGameResult, now_ms,
};
use crate::lobby::codegen;
use crate::lobby::snapshot::{Snapshot, VersionClock};
use crate::models::room::{Room, RoomStatus, RoomWithMembers};
use crate::models::room_member::{Location, MemberRole};
use crate::session;
use crate::state::AppState;

fn room_repo(state: &AppState) -> RoomRepository {
    RoomRepository::new(state.postgres.clone())
}

fn member_repo(state: &AppState) -> RoomMemberRepository {
    RoomMemberRepository::new(state.postgres.clone())
}

fn game_repo(state: &AppState) -> GameRepository {
    GameRepository::new(state.postgres.clone())
}

fn event_repo(state: &AppState) -> EventLogRepository {
    EventLogRepository::new(state.postgres.clone())
}

/// Fire-and-forget event logging: a failed log write never fails the
/// operation it is describing (§4.A).
async fn log_event(
    state: &AppState,
    room_id: Uuid,
    user_id: Option<Uuid>,
    event_type: &str,
    event_data: serde_json::Value,
) {
    if let Err(e) = event_repo(state).log(room_id, user_id, event_type, event_data).await {
        tracing::warn!(error = %e, event_type, "failed to write event log");
    }
}

async fn load_room_with_members(state: &AppState, room_code: &str) -> Result<RoomWithMembers, AppError> {
    room_repo(state)
        .get_room_with_members(room_code)
        .await?
        .ok_or(AppError::RoomNotFound)
}

fn find_member<'a>(
    rwm: &'a RoomWithMembers,
    user_id: Uuid,
) -> Option<&'a crate::models::room_member::RoomMemberWithUser> {
    rwm.members.iter().find(|m| m.user.id == user_id)
}

fn is_host(room: &Room, user_id: Uuid) -> bool {
    room.host_id == user_id
}

fn snapshot_from(rwm: &RoomWithMembers, reason: &str, source: &str, version_clock: &mut VersionClock) -> Snapshot {
    let version = version_clock.next(now_ms());
    Snapshot::build(&rwm.room, &rwm.members, reason, source, version, true)
}

async fn reload_snapshot(
    state: &AppState,
    room_code: &str,
    reason: &str,
    source: &str,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    Ok(snapshot_from(&rwm, reason, source, version_clock))
}

/// `createRoom` (§4.D). Called before any `RoomActor` exists for the new
/// code, so it talks to the repositories directly rather than through the
/// actor mailbox; every later operation on this room goes through the actor.
pub async fn create_room(
    state: &AppState,
    host_id: Uuid,
    max_players: i16,
    is_public: bool,
    streamer_mode: bool,
) -> Result<Snapshot, AppError> {
    let room_code = codegen::generate_room_code(&state.redis).await?;

    let (room, _host_member) = room_repo(state)
        .create_room_with_host(&room_code, host_id, max_players, is_public, streamer_mode)
        .await?;

    log_event(state, room.id, Some(host_id), "room_created", serde_json::json!({})).await;

    // The room has no actor yet; this snapshot uses a fresh, local version
    // clock rather than the actor's (which is spawned lazily on first later
    // reference). Version numbers are wall-clock derived, so a freshly
    // spawned actor's own clock naturally picks up strictly above this one.
    let mut version_clock = VersionClock::new();
    reload_snapshot(state, &room_code, "roomCreated", "host", &mut version_clock).await
}

/// `joinRoom` (§4.D): adds or rejoins `user_id` as a player, recording the
/// socket that performed the join and any chosen display name.
pub async fn join_room(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    player_name: &str,
    socket_id: Option<Uuid>,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    if player_name.trim().is_empty() || player_name.len() > 32 {
        return Err(AppError::InvalidPlayerName);
    }

    let rwm = load_room_with_members(state, room_code).await?;
    if !rwm.room.status.accepts_joins() {
        return Err(AppError::RoomNotAvailable);
    }

    let already_member = find_member(&rwm, user_id).is_some();
    if !already_member {
        let active = member_repo(state).count_active(rwm.room.id).await?;
        if active >= rwm.room.max_players as i64 {
            return Err(AppError::RoomFull);
        }
    }

    let now = Utc::now().naive_utc();
    let role = if is_host(&rwm.room, user_id) {
        MemberRole::Host
    } else {
        MemberRole::Player
    };
    member_repo(state)
        .add_participant(rwm.room.id, user_id, role, now)
        .await?;
    member_repo(state)
        .set_join_metadata(
            rwm.room.id,
            user_id,
            socket_id.map(|s| s.to_string()),
            Some(player_name.to_string()),
        )
        .await?;
    room_repo(state).touch_activity(rwm.room.id).await?;

    log_event(
        state,
        rwm.room.id,
        Some(user_id),
        "player_joined",
        serde_json::json!({ "playerName": player_name }),
    )
    .await;

    reload_snapshot(state, room_code, "playerJoined", "player", version_clock).await
}

/// `selectGame` (§4.D): host-only, only while the room is still forming.
pub async fn select_game(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    game_id: Uuid,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if !is_host(&rwm.room, user_id) {
        return Err(AppError::Forbidden("only the host may select a game".into()));
    }
    if rwm.room.status != RoomStatus::Lobby {
        return Err(AppError::RoomNotAvailable);
    }

    let game = game_repo(state)
        .find_by_id(game_id)
        .await?
        .ok_or_else(|| AppError::NotFound("game not found".into()))?;
    if !game.is_selectable() {
        return Err(AppError::RoomNotAvailable);
    }

    room_repo(state).set_current_game(rwm.room.id, Some(game_id)).await?;
    log_event(state, rwm.room.id, Some(user_id), "game_selected", serde_json::json!({ "gameId": game_id })).await;

    reload_snapshot(state, room_code, "gameSelected", "host", version_clock).await
}

/// `startGame` (§4.D): transitions the room to `in_game` and mints a
/// per-player session + redirect URL for every active member.
pub async fn start_game(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    settings: serde_json::Value,
    version_clock: &mut VersionClock,
) -> Result<StartGameResult, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if !is_host(&rwm.room, user_id) {
        return Err(AppError::Forbidden("only the host may start the game".into()));
    }
    if rwm.room.status != RoomStatus::Lobby {
        return Err(AppError::RoomNotAvailable);
    }
    let game_id = rwm.room.current_game.ok_or(AppError::RoomNotAvailable)?;
    let game = game_repo(state)
        .find_by_id(game_id)
        .await?
        .ok_or_else(|| AppError::NotFound("game not found".into()))?;
    if !game.is_selectable() {
        return Err(AppError::RoomNotAvailable);
    }
    if (rwm.members.len() as i16) < game.min_players {
        return Err(AppError::BadRequest("not enough players to start".into()));
    }

    if !settings.is_null() {
        room_repo(state).set_game_settings(rwm.room.id, settings).await?;
    }
    let now = Utc::now().naive_utc();
    let room = room_repo(state).start_game(rwm.room.id, now).await?;

    let mut redirect_urls = HashMap::with_capacity(rwm.members.len());
    for member in &rwm.members {
        let session = session::create_player_session(state, &room, member.user.id, game_id).await?;
        redirect_urls.insert(member.user.id, game.redirect_url(room_code, &session.session_token));
    }

    log_event(state, room.id, Some(user_id), "game_started", serde_json::json!({ "gameId": game_id })).await;

    let rwm = load_room_with_members(state, room_code).await?;
    let snapshot = snapshot_from(&rwm, "gameStarted", "host", version_clock);
    Ok(StartGameResult { snapshot, redirect_urls })
}

/// `leaveRoom` (§4.D): soft-removes the member; if the host leaves,
/// transfers the role to the longest-tenured remaining player, or abandons
/// the room if nobody is left.
pub async fn leave_room(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    let Some(member) = find_member(&rwm, user_id) else {
        return Err(AppError::NotFound("not a member of this room".into()));
    };
    let was_host = matches!(member.member.role, MemberRole::Host);

    let now = Utc::now().naive_utc();
    member_repo(state).mark_left(rwm.room.id, user_id, now).await?;
    log_event(state, rwm.room.id, Some(user_id), "player_left", serde_json::json!({})).await;

    let remaining: Vec<_> = rwm.members.iter().filter(|m| m.user.id != user_id).collect();
    if remaining.is_empty() {
        let room = room_repo(state).set_status(rwm.room.id, RoomStatus::Abandoned).await?;
        codegen::release_room_code(&state.redis, &room.room_code).await?;
        return reload_snapshot(state, room_code, "playerLeft", "player", version_clock).await;
    }

    if was_host {
        let new_host = remaining
            .iter()
            .min_by_key(|m| m.member.joined_at)
            .expect("remaining is non-empty");
        room_repo(state).set_host(rwm.room.id, new_host.user.id).await?;
        member_repo(state)
            .set_role(rwm.room.id, new_host.user.id, MemberRole::Host)
            .await?;
        log_event(
            state,
            rwm.room.id,
            Some(new_host.user.id),
            "host_transferred",
            serde_json::json!({ "reason": "previous host left" }),
        )
        .await;
    }

    room_repo(state).touch_activity(rwm.room.id).await?;
    reload_snapshot(state, room_code, "playerLeft", "player", version_clock).await
}

/// `transferHost` (§4.D): current host only, target must be an active member.
pub async fn transfer_host(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    target_id: Uuid,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if !is_host(&rwm.room, user_id) {
        return Err(AppError::Forbidden("only the host may transfer host".into()));
    }
    if find_member(&rwm, target_id).is_none() {
        return Err(AppError::NotFound("target is not a member of this room".into()));
    }

    room_repo(state).set_host(rwm.room.id, target_id).await?;
    member_repo(state).set_role(rwm.room.id, target_id, MemberRole::Host).await?;
    member_repo(state).set_role(rwm.room.id, user_id, MemberRole::Player).await?;
    log_event(state, rwm.room.id, Some(user_id), "host_transferred", serde_json::json!({ "to": target_id })).await;

    reload_snapshot(state, room_code, "hostTransferred", "host", version_clock).await
}

/// `kickPlayer` (§4.D): host-only, cannot kick self.
pub async fn kick_player(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    target_id: Uuid,
    reason: Option<String>,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if !is_host(&rwm.room, user_id) {
        return Err(AppError::Forbidden("only the host may kick players".into()));
    }
    if target_id == user_id {
        return Err(AppError::BadRequest("host cannot kick itself".into()));
    }
    if find_member(&rwm, target_id).is_none() {
        return Err(AppError::NotFound("target is not a member of this room".into()));
    }

    let now = Utc::now().naive_utc();
    member_repo(state).mark_left(rwm.room.id, target_id, now).await?;
    log_event(
        state,
        rwm.room.id,
        Some(user_id),
        "player_kicked",
        serde_json::json!({ "target": target_id, "reason": reason }),
    )
    .await;

    for socket_id in state.connections.socket_ids_for_user_in_room(room_code, target_id).await {
        tracing::debug!(%socket_id, target = %target_id, "closing socket for kicked player");
    }

    reload_snapshot(state, room_code, "playerKicked", "host", version_clock).await
}

/// `toggleReady`/`setReady` (§4.D): any member may flag themselves ready or
/// not; unlike most lobby ops this isn't host-only, since readiness is a
/// per-player signal the host reads before calling `startGame`, not a room
/// mutation the host performs on someone else's behalf.
pub async fn set_ready(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    ready: bool,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if find_member(&rwm, user_id).is_none() {
        return Err(AppError::NotFound("not a member of this room".into()));
    }

    member_repo(state).set_ready(rwm.room.id, user_id, ready).await?;
    log_event(state, rwm.room.id, Some(user_id), "player_ready_changed", serde_json::json!({ "ready": ready })).await;

    reload_snapshot(state, room_code, "playerStatusUpdated", "player", version_clock).await
}

/// `updatePlayerLocation` (§4.E): writes both the durable row and the
/// ephemeral Redis presence cache, suppressing the write during an active
/// return-to-lobby grace window (§4.D/§4.E) unless the new location is
/// itself `lobby` (i.e. the return actually completing).
pub async fn update_player_location(
    state: &AppState,
    room_code: &str,
    user_id: Uuid,
    new_location: Location,
    version_clock: &mut VersionClock,
) -> Result<Option<Snapshot>, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if find_member(&rwm, user_id).is_none() {
        return Err(AppError::NotFound("not a member of this room".into()));
    }

    if new_location == Location::Disconnected {
        if let Some(grace_until) = rwm.room.return_grace_until() {
            if Utc::now().naive_utc() < grace_until {
                tracing::debug!(room_code, %user_id, "dropped disconnect signal inside return grace window");
                return Ok(None);
            }
        }
    }

    let now = Utc::now().naive_utc();
    member_repo(state)
        .set_location(rwm.room.id, user_id, new_location, now)
        .await?;
    let presence = crate::db::presence::PresenceRepository::new(state.redis.clone());
    if let Err(e) = presence.set_location(rwm.room.id, user_id, new_location).await {
        tracing::warn!(error = %e, "failed to update presence cache");
    }
    room_repo(state).touch_activity(rwm.room.id).await?;

    if new_location == Location::Disconnected && is_host(&rwm.room, user_id) {
        reassign_host_on_disconnect(state, &rwm, user_id).await?;
    }

    log_event(
        state,
        rwm.room.id,
        Some(user_id),
        "player_status_updated",
        serde_json::json!({ "location": new_location }),
    )
    .await;

    reload_snapshot(state, room_code, "playerStatusUpdated", "status-sync", version_clock)
        .await
        .map(Some)
}

/// Scenario S2: a host who merely disconnects (socket drop, sweeper-detected
/// idle timeout) re-triggers the same host-standing check `leave_room`
/// performs on an explicit departure — promoted to the longest-tenured
/// remaining *connected* member. Unlike `leave_room`, a room with no other
/// connected member is left as-is rather than abandoned; a disconnect alone
/// never abandons a room, only an explicit leave with nobody left does.
async fn reassign_host_on_disconnect(
    state: &AppState,
    rwm: &RoomWithMembers,
    disconnected_user_id: Uuid,
) -> Result<(), AppError> {
    let Some(new_host) = rwm
        .members
        .iter()
        .filter(|m| m.user.id != disconnected_user_id && m.member.is_connected)
        .min_by_key(|m| m.member.joined_at)
    else {
        return Ok(());
    };

    room_repo(state).set_host(rwm.room.id, new_host.user.id).await?;
    member_repo(state).set_role(rwm.room.id, new_host.user.id, MemberRole::Host).await?;
    member_repo(state)
        .set_role(rwm.room.id, disconnected_user_id, MemberRole::Player)
        .await?;
    log_event(
        state,
        rwm.room.id,
        Some(new_host.user.id),
        "host_transferred",
        serde_json::json!({ "reason": "previous host disconnected" }),
    )
    .await;
    Ok(())
}

/// `handleHeartbeat` (§4.E): bumps `last_ping`, doesn't change the location
/// itself — a still-`disconnected` member can still heartbeat while
/// reconnect logic on the client side catches up.
pub async fn handle_heartbeat(state: &AppState, room_code: &str, user_id: Uuid) -> Result<HeartbeatResult, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    let Some(member) = find_member(&rwm, user_id) else {
        return Err(AppError::NotFound("not a member of this room".into()));
    };

    let now = Utc::now().naive_utc();
    member_repo(state)
        .set_location(rwm.room.id, user_id, member.member.current_location, now)
        .await?;
    let presence = crate::db::presence::PresenceRepository::new(state.redis.clone());
    if let Err(e) = presence.set_location(rwm.room.id, user_id, member.member.current_location).await {
        tracing::warn!(error = %e, "failed to refresh presence cache on heartbeat");
    }
    room_repo(state).touch_activity(rwm.room.id).await?;

    let should_return = rwm.room.pending_return() && member.member.current_location == Location::Game;
    Ok(HeartbeatResult { ok: true, should_return })
}

/// `bulkUpdatePlayerStatus` (§4.E): applies a batch of location transitions
/// in one statement, per player, with an error isolated to that player only.
pub async fn bulk_update_player_status(
    state: &AppState,
    room_code: &str,
    updates: Vec<BulkStatusUpdate>,
    reason: &str,
    version_clock: &mut VersionClock,
) -> Result<BulkUpdateResult, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    let now = Utc::now().naive_utc();

    let mut by_location: HashMap<Location, Vec<Uuid>> = HashMap::new();
    let mut results = Vec::with_capacity(updates.len());

    for update in &updates {
        if find_member(&rwm, update.user_id).is_none() {
            results.push(PerPlayerResult {
                user_id: update.user_id,
                applied: false,
                error: Some("not a member of this room".to_string()),
            });
            continue;
        }
        by_location.entry(update.location).or_default().push(update.user_id);
        results.push(PerPlayerResult { user_id: update.user_id, applied: true, error: None });
    }

    for (location, user_ids) in &by_location {
        if let Err(e) = member_repo(state).bulk_set_location(rwm.room.id, user_ids, *location, now).await {
            tracing::error!(error = %e, "bulk status update failed for a location group");
            for r in results.iter_mut().filter(|r| user_ids.contains(&r.user_id)) {
                r.applied = false;
                r.error = Some("database error".to_string());
            }
        }
    }

    room_repo(state).touch_activity(rwm.room.id).await?;
    log_event(
        state,
        rwm.room.id,
        None,
        "bulk_status_updated",
        serde_json::json!({ "reason": reason, "count": updates.len() }),
    )
    .await;

    let snapshot = reload_snapshot(state, room_code, "playerStatusUpdated", "status-sync", version_clock).await?;
    Ok(BulkUpdateResult { results, snapshot })
}

/// `handleGameEnd` (§4.E): the single funnel point for every path that ends
/// a game — the host's socket event, and the External Game API's
/// `/game-end` and `/return-all` — so the return-to-lobby transition has
/// exactly one implementation regardless of who triggered it.
pub async fn handle_game_end(
    state: &AppState,
    room_code: &str,
    source: &str,
    metadata: serde_json::Value,
    version_clock: &mut VersionClock,
) -> Result<GameEndResult, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if rwm.room.status.is_terminal() {
        return Err(AppError::RoomNotAvailable);
    }
    let game_at_return = rwm.room.current_game;

    let grace_until = Utc::now().naive_utc() + chrono::Duration::seconds(state.config.return_grace_seconds);
    let mut next_metadata = rwm.room.metadata.clone();
    if let Some(obj) = next_metadata.as_object_mut() {
        obj.insert("pendingReturn".to_string(), serde_json::Value::Bool(true));
        obj.insert(
            "return_in_progress_until".to_string(),
            serde_json::Value::String(DateTime::<Utc>::from_naive_utc_and_offset(grace_until, Utc).to_rfc3339()),
        );
        obj.insert("returnInitiatedBy".to_string(), serde_json::Value::String(source.to_string()));
    }
    room_repo(state).set_metadata(rwm.room.id, next_metadata).await?;

    let user_ids: Vec<Uuid> = rwm.members.iter().map(|m| m.user.id).collect();
    member_repo(state)
        .bulk_set_location(rwm.room.id, &user_ids, Location::Lobby, Utc::now().naive_utc())
        .await?;

    let room = room_repo(state).return_to_lobby(rwm.room.id).await?;
    let revoked = crate::db::player_session::PlayerSessionRepository::new(state.postgres.clone())
        .revoke_all_for_room(room.id)
        .await?;

    log_event(
        state,
        room.id,
        None,
        "game_ended",
        serde_json::json!({ "source": source, "metadata": metadata, "sessionsRevoked": revoked }),
    )
    .await;

    // Streamer-mode group return (S5): mint a generic, user-less session
    // alongside the per-player ones so a stream overlay can resume into the
    // lobby without ever learning the room code.
    let group_return_url = if room.streamer_mode {
        match game_at_return {
            Some(game_id) => match session::create_generic_session(state, &room, game_id).await {
                Ok(generic) => Some(session::build_group_return_url(&state.config.client_url, &generic.session_token)),
                Err(e) => {
                    tracing::warn!(error = %e, room_code, "failed to mint generic group-return session");
                    None
                }
            },
            None => None,
        }
    } else {
        None
    };

    let snapshot = reload_snapshot(state, room_code, "playerReturnedToLobby", source, version_clock).await?;
    Ok(GameEndResult { snapshot, group_return_url })
}

/// `abandonRoom`: terminal transition for a room with no one left, or that
/// the External Game API / sweeper has flagged as unrecoverable.
pub async fn abandon_room(
    state: &AppState,
    room_code: &str,
    reason: &str,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    let rwm = load_room_with_members(state, room_code).await?;
    if rwm.room.status.is_terminal() {
        return reload_snapshot(state, room_code, "roomClosed", "system", version_clock).await;
    }

    room_repo(state).set_status(rwm.room.id, RoomStatus::Abandoned).await?;
    codegen::release_room_code(&state.redis, room_code).await?;
    crate::db::player_session::PlayerSessionRepository::new(state.postgres.clone())
        .revoke_all_for_room(rwm.room.id)
        .await?;
    log_event(state, rwm.room.id, None, "room_abandoned", serde_json::json!({ "reason": reason })).await;

    reload_snapshot(state, room_code, "roomClosed", "system", version_clock).await
}

/// `syncRoomStatus` (§4.E): rebuilds and rebroadcasts the current snapshot
/// without mutating anything — used by the internal/admin surface and by the
/// periodic sweeper after it reconciles idle members.
pub async fn sync_room_status(
    state: &AppState,
    room_code: &str,
    version_clock: &mut VersionClock,
) -> Result<Snapshot, AppError> {
    reload_snapshot(state, room_code, "playerStatusUpdated", "sync", version_clock).await
}
