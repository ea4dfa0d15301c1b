//! Internal/admin surface (§6), gated by the single `GAMEBUDDIES_API_KEY`
//! master credential rather than a per-game `ApiKey` row. Operational
//! visibility and the one administrative mutation (forcing a room's
//! snapshot to resync) live here, distinct from the per-game External Game API.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::auth::AdminAuth;
use crate::connection::ConnectionStats;
use crate::db::room::RoomRepository;
use crate::errors::AppError;
use crate::lobby::actor::{self, dispatch};
use crate::lobby::snapshot::Snapshot;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_room;
use crate::ws::messages::RoomServerMessage;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStats {
    connections: ConnectionStats,
    active_rooms: i64,
}

pub async fn stats(State(state): State<AppState>, _admin: AdminAuth) -> Result<Json<OperatorStats>, AppError> {
    let connections = state.connections.stats().await;
    let active_rooms = RoomRepository::new(state.postgres.clone()).count_active().await?;
    Ok(Json(OperatorStats { connections, active_rooms }))
}

/// `syncRoomStatus`: rebuilds and rebroadcasts a room's snapshot on demand,
/// without mutating membership. Used by operators chasing a report of a
/// stuck client after the periodic sweeper's own pass.
pub async fn sync_room_status(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
    _admin: AdminAuth,
) -> Result<Json<Snapshot>, AppError> {
    let snapshot = dispatch(&state, &room_code, |reply| actor::RoomCommand::SyncRoomStatus { reply }).await?;
    broadcast_room(&state, &room_code, &RoomServerMessage::PlayerStatusUpdated { snapshot: snapshot.clone() }).await;
    Ok(Json(snapshot))
}
