//! Lobby Manager + Status Sync Manager (§4.D, §4.E), concurrency model (§5).
//!
//! One `RoomActor` per live room code owns every mutation and every snapshot
//! emission for that room. Callers never touch a room's row directly; they
//! send a `RoomCommand` through the actor's mailbox and await the reply. No
//! lock is held across a suspension point because no lock exists at all —
//! the single task processing the mailbox *is* the serialization primitive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

use crate::errors::AppError;
use crate::lobby::ops;
use crate::lobby::snapshot::{Snapshot, VersionClock};
use crate::models::room_member::Location;
use crate::state::AppState;

pub type Reply<T> = oneshot::Sender<Result<T, AppError>>;

#[derive(Debug, Clone)]
pub struct BulkStatusUpdate {
    pub user_id: Uuid,
    pub location: Location,
    pub dedup_timestamp: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerPlayerResult {
    pub user_id: Uuid,
    pub applied: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub results: Vec<PerPlayerResult>,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    pub ok: bool,
    pub should_return: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameResult {
    pub snapshot: Snapshot,
    pub redirect_urls: HashMap<Uuid, String>,
}

/// Result of `handleGameEnd` (§4.E). `group_return_url` is populated only for
/// streamer-mode rooms (scenario S5): a generic, user-less session minted
/// alongside the ordinary per-player ones, pointing non-member recipients
/// (e.g. a stream overlay) at the lobby without ever exposing the room code.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndResult {
    pub snapshot: Snapshot,
    pub group_return_url: Option<String>,
}

pub enum RoomCommand {
    JoinRoom {
        user_id: Uuid,
        player_name: String,
        socket_id: Option<Uuid>,
        reply: Reply<Snapshot>,
    },
    SelectGame {
        user_id: Uuid,
        game_id: Uuid,
        reply: Reply<Snapshot>,
    },
    StartGame {
        user_id: Uuid,
        settings: serde_json::Value,
        reply: Reply<StartGameResult>,
    },
    LeaveRoom {
        user_id: Uuid,
        reply: Reply<Snapshot>,
    },
    TransferHost {
        user_id: Uuid,
        target_id: Uuid,
        reply: Reply<Snapshot>,
    },
    KickPlayer {
        user_id: Uuid,
        target_id: Uuid,
        reason: Option<String>,
        reply: Reply<Snapshot>,
    },
    UpdatePlayerLocation {
        user_id: Uuid,
        new_location: Location,
        dedup_timestamp: i64,
        reply: Reply<Option<Snapshot>>,
    },
    SetReady {
        user_id: Uuid,
        ready: bool,
        reply: Reply<Snapshot>,
    },
    Heartbeat {
        user_id: Uuid,
        reply: Reply<HeartbeatResult>,
    },
    BulkUpdateStatus {
        updates: Vec<BulkStatusUpdate>,
        reason: String,
        reply: Reply<BulkUpdateResult>,
    },
    GameEnd {
        source: String,
        metadata: serde_json::Value,
        reply: Reply<GameEndResult>,
    },
    Abandon {
        reason: String,
        reply: Reply<Snapshot>,
    },
    SyncRoomStatus {
        reply: Reply<Snapshot>,
    },
}

/// Process-local, per-room actor. `seen_dedup_keys` backs the idempotency
/// requirement of §5: the same `(roomCode, userId, newLocation, timestamp)`
/// tuple is applied at most once.
struct RoomActor {
    room_code: String,
    state: AppState,
    version_clock: VersionClock,
    seen_dedup_keys: HashSet<(Uuid, Location, i64)>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        while let Some(cmd) = self.receiver.recv().await {
            self.handle(cmd).await;
        }
        tracing::debug!(room_code = %self.room_code, "room actor mailbox drained, exiting");
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::JoinRoom {
                user_id,
                player_name,
                socket_id,
                reply,
            } => {
                let result = ops::join_room(
                    &self.state,
                    &self.room_code,
                    user_id,
                    &player_name,
                    socket_id,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::SelectGame {
                user_id,
                game_id,
                reply,
            } => {
                let result = ops::select_game(
                    &self.state,
                    &self.room_code,
                    user_id,
                    game_id,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::StartGame {
                user_id,
                settings,
                reply,
            } => {
                let result = ops::start_game(
                    &self.state,
                    &self.room_code,
                    user_id,
                    settings,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::LeaveRoom { user_id, reply } => {
                let result =
                    ops::leave_room(&self.state, &self.room_code, user_id, &mut self.version_clock)
                        .await;
                let _ = reply.send(result);
            }
            RoomCommand::TransferHost {
                user_id,
                target_id,
                reply,
            } => {
                let result = ops::transfer_host(
                    &self.state,
                    &self.room_code,
                    user_id,
                    target_id,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::KickPlayer {
                user_id,
                target_id,
                reason,
                reply,
            } => {
                let result = ops::kick_player(
                    &self.state,
                    &self.room_code,
                    user_id,
                    target_id,
                    reason,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::UpdatePlayerLocation {
                user_id,
                new_location,
                dedup_timestamp,
                reply,
            } => {
                let dedup_key = (user_id, new_location, dedup_timestamp);
                if self.seen_dedup_keys.contains(&dedup_key) {
                    let _ = reply.send(Ok(None));
                    return;
                }
                let result = ops::update_player_location(
                    &self.state,
                    &self.room_code,
                    user_id,
                    new_location,
                    &mut self.version_clock,
                )
                .await;
                if matches!(result, Ok(Some(_))) {
                    self.seen_dedup_keys.insert(dedup_key);
                }
                let _ = reply.send(result);
            }
            RoomCommand::SetReady { user_id, ready, reply } => {
                let result =
                    ops::set_ready(&self.state, &self.room_code, user_id, ready, &mut self.version_clock).await;
                let _ = reply.send(result);
            }
            RoomCommand::Heartbeat { user_id, reply } => {
                let result = ops::handle_heartbeat(&self.state, &self.room_code, user_id).await;
                let _ = reply.send(result);
            }
            RoomCommand::BulkUpdateStatus {
                updates,
                reason,
                reply,
            } => {
                let fresh: Vec<BulkStatusUpdate> = updates
                    .into_iter()
                    .filter(|u| {
                        let key = (u.user_id, u.location, u.dedup_timestamp);
                        if self.seen_dedup_keys.contains(&key) {
                            false
                        } else {
                            self.seen_dedup_keys.insert(key);
                            true
                        }
                    })
                    .collect();
                let result = ops::bulk_update_player_status(
                    &self.state,
                    &self.room_code,
                    fresh,
                    &reason,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::GameEnd {
                source,
                metadata,
                reply,
            } => {
                let result = ops::handle_game_end(
                    &self.state,
                    &self.room_code,
                    &source,
                    metadata,
                    &mut self.version_clock,
                )
                .await;
                let _ = reply.send(result);
            }
            RoomCommand::Abandon { reason, reply } => {
                let result =
                    ops::abandon_room(&self.state, &self.room_code, &reason, &mut self.version_clock)
                        .await;
                let _ = reply.send(result);
            }
            RoomCommand::SyncRoomStatus { reply } => {
                let result =
                    ops::sync_room_status(&self.state, &self.room_code, &mut self.version_clock)
                        .await;
                let _ = reply.send(result);
            }
        }
    }
}

/// Hands out mailboxes, spawning a fresh actor task on first reference to a
/// room code. `Mutex<HashMap<...>>` rather than a concurrent-map crate,
/// consistent with the ambient stack's preference.
#[derive(Clone)]
pub struct RoomActorRegistry {
    senders: Arc<Mutex<HashMap<String, mpsc::Sender<RoomCommand>>>>,
}

impl RoomActorRegistry {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the mailbox for `room_code`, spawning an actor task if this
    /// is the first reference. The registry lock is held only long enough
    /// to check/insert the map entry, never across actor work.
    pub async fn get_or_spawn(&self, state: &AppState, room_code: &str) -> mpsc::Sender<RoomCommand> {
        let mut senders = self.senders.lock().await;
        if let Some(sender) = senders.get(room_code) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let (tx, rx) = mpsc::channel(256);
        let actor = RoomActor {
            room_code: room_code.to_string(),
            state: state.clone(),
            version_clock: VersionClock::new(),
            seen_dedup_keys: HashSet::new(),
            receiver: rx,
        };
        tokio::spawn(actor.run());
        senders.insert(room_code.to_string(), tx.clone());
        tx
    }

    /// Drops the registry's handle to a room's mailbox once it reaches a
    /// terminal status; the actor task exits on its own once the sender
    /// side is fully dropped and its queue drains.
    pub async fn forget(&self, room_code: &str) {
        self.senders.lock().await.remove(room_code);
    }
}

impl Default for RoomActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends `cmd` to the room's actor and awaits its reply, spawning the actor
/// if this is the first reference to `room_code`.
pub async fn dispatch<T>(
    state: &AppState,
    room_code: &str,
    build: impl FnOnce(Reply<T>) -> RoomCommand,
) -> Result<T, AppError> {
    let sender = state.rooms.get_or_spawn(state, room_code).await;
    let (reply_tx, reply_rx) = oneshot::channel();
    sender
        .send(build(reply_tx))
        .await
        .map_err(|_| AppError::ServerError)?;
    reply_rx.await.map_err(|_| AppError::ServerError)?
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
