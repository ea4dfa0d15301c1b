//! Periodic sweeper (§4.E): demotes members whose heartbeat has gone silent
//! to `disconnected`, and rooms that have sat idle past the configured
//! threshold to `abandoned`. A `tokio::spawn`-ed loop polling at a fixed
//! interval shorter than `PING_TIMEOUT`, mirroring the ambient stack's
//! countdown-then-start background task pattern.

use std::time::Duration;

use chrono::Utc;

use crate::db::event_log::EventLogRepository;
use crate::db::player_session::PlayerSessionRepository;
use crate::db::room::RoomRepository;
use crate::db::room_member::RoomMemberRepository;
use crate::errors::AppError;
use crate::lobby::actor::{self, dispatch};
use crate::models::room_member::Location;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_room;
use crate::ws::messages::RoomServerMessage;

pub fn spawn(state: AppState) {
    tokio::spawn(run(state));
}

async fn run(state: AppState) {
    let poll_interval = Duration::from_secs((state.config.ping_timeout_secs / 2).max(5));
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        ticker.tick().await;
        if let Err(e) = sweep_idle_members(&state).await {
            tracing::error!(error = %e, "member sweep failed");
        }
        if let Err(e) = sweep_idle_rooms(&state).await {
            tracing::error!(error = %e, "room sweep failed");
        }
        if let Err(e) = sweep_expired_sessions(&state).await {
            tracing::error!(error = %e, "session retention sweep failed");
        }
        if let Err(e) = sweep_expired_event_logs(&state).await {
            tracing::error!(error = %e, "event log retention sweep failed");
        }
    }
}

async fn sweep_idle_members(state: &AppState) -> Result<(), AppError> {
    let cutoff = Utc::now().naive_utc() - chrono::Duration::seconds(state.config.ping_timeout_secs as i64);
    let member_repo = RoomMemberRepository::new(state.postgres.clone());
    let room_repo = RoomRepository::new(state.postgres.clone());

    for (room_id, user_id) in member_repo.find_stale_connected(cutoff).await? {
        let Some(room) = room_repo.find_by_id(room_id).await? else {
            continue;
        };
        if room.status.is_terminal() {
            continue;
        }

        let result = dispatch(state, &room.room_code, |reply| actor::RoomCommand::UpdatePlayerLocation {
            user_id,
            new_location: Location::Disconnected,
            dedup_timestamp: Utc::now().timestamp_millis(),
            reply,
        })
        .await;

        match result {
            Ok(Some(snapshot)) => {
                tracing::info!(room_code = %room.room_code, %user_id, "swept idle member to disconnected");
                broadcast_room(state, &room.room_code, &RoomServerMessage::PlayerStatusUpdated { snapshot }).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, room_code = %room.room_code, %user_id, "failed to sweep idle member"),
        }
    }
    Ok(())
}

async fn sweep_idle_rooms(state: &AppState) -> Result<(), AppError> {
    let room_repo = RoomRepository::new(state.postgres.clone());
    let cutoff = Utc::now().naive_utc() - chrono::Duration::minutes(state.config.idle_room_cleanup_minutes);

    for room in room_repo.find_idle_since(cutoff).await? {
        let result = dispatch(state, &room.room_code, |reply| actor::RoomCommand::Abandon {
            reason: "idle room cleanup".to_string(),
            reply,
        })
        .await;

        match result {
            Ok(snapshot) => {
                tracing::info!(room_code = %room.room_code, "swept idle room to abandoned");
                broadcast_room(state, &room.room_code, &RoomServerMessage::RoomClosed { snapshot }).await;
                state.rooms.forget(&room.room_code).await;
            }
            Err(e) => tracing::warn!(error = %e, room_code = %room.room_code, "failed to sweep idle room"),
        }
    }
    Ok(())
}

/// Reclaims non-active `player_sessions` rows once they've been expired for
/// at least `idle_room_cleanup_minutes` — reusing that knob rather than
/// inventing a separate retention SLA (no retention duration is named
/// anywhere in the core's configuration surface).
async fn sweep_expired_sessions(state: &AppState) -> Result<(), AppError> {
    let cutoff = Utc::now().naive_utc() - chrono::Duration::minutes(state.config.idle_room_cleanup_minutes);
    let repo = PlayerSessionRepository::new(state.postgres.clone());
    let deleted = repo.delete_expired_before(cutoff).await?;
    if deleted > 0 {
        tracing::info!(deleted, "reclaimed expired player sessions");
    }
    Ok(())
}

/// `event_logs` retention (§3: "Retention ≤ 30 days").
async fn sweep_expired_event_logs(state: &AppState) -> Result<(), AppError> {
    let repo = EventLogRepository::new(state.postgres.clone());
    let deleted = repo.sweep_expired().await?;
    if deleted > 0 {
        tracing::info!(deleted, "swept expired event log rows");
    }
    Ok(())
}
