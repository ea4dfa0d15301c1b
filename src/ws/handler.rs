//! WebSocket upgrade + per-connection read loop (§4.B, §6). One task per
//! socket; every mutation is handed to the room's actor via `dispatch` and
//! the reply is fanned out with `ws::broadcast`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::WsAuth;
use crate::connection::Sender;
use crate::errors::AppError;
use crate::lobby::actor::{self, dispatch};
use crate::models::room_member::Location;
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_room, send_to};
use crate::ws::messages::{RoomClientMessage, RoomServerMessage};

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    WsAuth(auth): WsAuth,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, auth.user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (sink, mut receiver) = socket.split();
    let socket_id = Uuid::new_v4();
    let sender: Sender = Arc::new(Mutex::new(sink));
    let mut current_room: Option<String> = None;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let parsed: Result<RoomClientMessage, _> = serde_json::from_str(&text);
                match parsed {
                    Ok(client_msg) => {
                        handle_message(&state, socket_id, user_id, &sender, &mut current_room, client_msg).await;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "unparseable socket message");
                        send_to(&sender, &RoomServerMessage::from(AppError::BadRequest("invalid message".into()))).await;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(error = %e, "ws recv error");
                break;
            }
        }
    }

    if let Some((uid, room_code)) = state.connections.disconnect(socket_id).await {
        tracing::debug!(%socket_id, %uid, room_code, "socket disconnected");

        // §4.E: socket disconnect is one of the three input streams into the
        // Status Sync Manager. Only flip presence to `disconnected` once this
        // was the user's last live socket in the room — a second open tab
        // should keep them connected.
        if state.connections.get_user_sockets_in_room(&room_code, uid).await.is_empty() {
            match dispatch(&state, &room_code, |reply| actor::RoomCommand::UpdatePlayerLocation {
                user_id: uid,
                new_location: Location::Disconnected,
                dedup_timestamp: actor::now_ms(),
                reply,
            })
            .await
            {
                Ok(Some(snapshot)) => {
                    broadcast_room(&state, &room_code, &RoomServerMessage::PlayerStatusUpdated { snapshot }).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(error = %e, %room_code, %uid, "failed to mark disconnected socket's presence")
                }
            }
        }
    }
}

async fn handle_message(
    state: &AppState,
    socket_id: Uuid,
    user_id: Uuid,
    sender: &Sender,
    current_room: &mut Option<String>,
    msg: RoomClientMessage,
) {
    match msg {
        RoomClientMessage::CreateRoom { host_name, max_players, is_public, streamer_mode } => {
            match crate::lobby::ops::create_room(state, user_id, max_players, is_public, streamer_mode).await {
                Ok(created) => {
                    let Some(room_code) = created.room.code.clone() else {
                        send_to(sender, &RoomServerMessage::from(AppError::ServerError)).await;
                        return;
                    };
                    match dispatch(state, &room_code, |reply| actor::RoomCommand::JoinRoom {
                        user_id,
                        player_name: host_name.clone(),
                        socket_id: Some(socket_id),
                        reply,
                    })
                    .await
                    {
                        Ok(snapshot) => {
                            if let Err(e) = state.connections.register(socket_id, user_id, room_code.clone(), sender.clone()).await {
                                send_to(sender, &RoomServerMessage::from(e)).await;
                                return;
                            }
                            *current_room = Some(room_code);
                            send_to(sender, &RoomServerMessage::RoomCreated { snapshot }).await;
                        }
                        Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
                    }
                }
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::JoinRoom { room_code, player_name } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::JoinRoom {
                user_id,
                player_name,
                socket_id: Some(socket_id),
                reply,
            })
            .await
            {
                Ok(snapshot) => {
                    if let Err(e) = state.connections.register(socket_id, user_id, room_code.clone(), sender.clone()).await {
                        send_to(sender, &RoomServerMessage::from(e)).await;
                        return;
                    }
                    *current_room = Some(room_code.clone());
                    send_to(sender, &RoomServerMessage::RoomJoined { snapshot: snapshot.clone() }).await;
                    broadcast_room(state, &room_code, &RoomServerMessage::PlayerJoined { snapshot }).await;
                }
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::JoinSocketRoom { room_code } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::SyncRoomStatus { reply }).await {
                Ok(snapshot) => {
                    if !snapshot.players.iter().any(|p| p.id == user_id) {
                        send_to(sender, &RoomServerMessage::from(AppError::Forbidden("not a member of this room".into()))).await;
                        return;
                    }
                    if let Err(e) = state.connections.register(socket_id, user_id, room_code.clone(), sender.clone()).await {
                        send_to(sender, &RoomServerMessage::from(e)).await;
                        return;
                    }
                    *current_room = Some(room_code);
                    send_to(sender, &RoomServerMessage::RoomJoined { snapshot }).await;
                }
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::SelectGame { room_code, game_id } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::SelectGame { user_id, game_id, reply }).await {
                Ok(snapshot) => broadcast_room(state, &room_code, &RoomServerMessage::GameSelected { snapshot }).await,
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::StartGame { room_code, settings } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::StartGame { user_id, settings, reply }).await {
                Ok(result) => {
                    for (member_id, redirect_url) in result.redirect_urls {
                        for member_sender in state.connections.get_user_sockets_in_room(&room_code, member_id).await {
                            send_to(
                                &member_sender,
                                &RoomServerMessage::GameStarted { snapshot: result.snapshot.clone(), redirect_url: Some(redirect_url.clone()) },
                            )
                            .await;
                        }
                    }
                }
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::LeaveRoom { room_code } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::LeaveRoom { user_id, reply }).await {
                Ok(snapshot) => {
                    state.connections.disconnect(socket_id).await;
                    *current_room = None;
                    let abandoned = snapshot.room.status.is_terminal();
                    broadcast_room(state, &room_code, &RoomServerMessage::PlayerLeft { snapshot }).await;
                    if abandoned {
                        state.rooms.forget(&room_code).await;
                    }
                }
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        // §4.D/§9: the host sending this event ends the game for the whole
        // room (funnels into the same `handleGameEnd` as the External Game
        // API's `/game-end`/`/return-all`); any other member sending it is
        // just returning themselves, an ordinary location update.
        RoomClientMessage::PlayerReturnToLobby { room_code } => {
            let snapshot = match dispatch(state, &room_code, |reply| actor::RoomCommand::SyncRoomStatus { reply }).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    send_to(sender, &RoomServerMessage::from(e)).await;
                    return;
                }
            };
            let is_host = snapshot.players.iter().any(|p| p.id == user_id && p.is_host);

            if is_host {
                match dispatch(state, &room_code, |reply| actor::RoomCommand::GameEnd {
                    source: "host".to_string(),
                    metadata: serde_json::json!({}),
                    reply,
                })
                .await
                {
                    Ok(result) => {
                        let streamer_mode = result.snapshot.room.streamer_mode;
                        broadcast_room(state, &room_code, &RoomServerMessage::PlayerReturnedToLobby { snapshot: result.snapshot }).await;
                        if streamer_mode {
                            broadcast_room(
                                state,
                                &room_code,
                                &RoomServerMessage::ServerReturnToGb {
                                    room_code: None,
                                    mode: "group",
                                    initiated_at: chrono::Utc::now().to_rfc3339(),
                                    reason: "host_ended_game".to_string(),
                                },
                            )
                            .await;
                        }
                    }
                    Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
                }
            } else {
                match dispatch(state, &room_code, |reply| actor::RoomCommand::UpdatePlayerLocation {
                    user_id,
                    new_location: Location::Lobby,
                    dedup_timestamp: actor::now_ms(),
                    reply,
                })
                .await
                {
                    Ok(Some(snapshot)) => {
                        broadcast_room(state, &room_code, &RoomServerMessage::PlayerReturnedToLobby { snapshot }).await;
                    }
                    Ok(None) => {}
                    Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
                }
            }
        }

        RoomClientMessage::SetReady { room_code, ready } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::SetReady { user_id, ready, reply }).await {
                Ok(snapshot) => broadcast_room(state, &room_code, &RoomServerMessage::PlayerStatusUpdated { snapshot }).await,
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::TransferHost { room_code, target_id } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::TransferHost { user_id, target_id, reply }).await {
                Ok(snapshot) => broadcast_room(state, &room_code, &RoomServerMessage::HostTransferred { snapshot }).await,
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }

        RoomClientMessage::KickPlayer { room_code, target_id, reason } => {
            match dispatch(state, &room_code, |reply| actor::RoomCommand::KickPlayer { user_id, target_id, reason, reply }).await {
                Ok(snapshot) => {
                    broadcast_room(state, &room_code, &RoomServerMessage::PlayerKicked { snapshot }).await;
                    for kicked_sender in state.connections.get_user_sockets_in_room(&room_code, target_id).await {
                        use axum::extract::ws::Message as WsMessage;
                        use futures::SinkExt;
                        let mut s = kicked_sender.lock().await;
                        let _ = s.send(WsMessage::Close(None)).await;
                    }
                }
                Err(e) => send_to(sender, &RoomServerMessage::from(e)).await,
            }
        }
    }
}
