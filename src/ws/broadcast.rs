//! Fan-out helpers built on `ConnectionManager`'s room/user indices. Every
//! send runs on its own spawned task so a single slow/dead socket never
//! blocks the room actor's reply or its siblings' delivery.

use serde::Serialize;

use crate::connection::Sender;
use crate::state::AppState;

pub async fn send_to<M: Serialize>(sender: &Sender, msg: &M) {
    let Ok(json) = serde_json::to_string(msg) else {
        return;
    };
    let sender = sender.clone();
    tokio::spawn(async move {
        use axum::extract::ws::Message;
        use futures::SinkExt;
        let mut s = sender.lock().await;
        let _ = s.send(Message::Text(json.into())).await;
    });
}

pub async fn broadcast_room<M: Serialize>(state: &AppState, room_code: &str, msg: &M) {
    let Ok(json) = serde_json::to_string(msg) else {
        return;
    };
    for (_user_id, sender) in state.connections.get_room_sockets(room_code).await {
        let json = json.clone();
        tokio::spawn(async move {
            use axum::extract::ws::Message;
            use futures::SinkExt;
            let mut s = sender.lock().await;
            let _ = s.send(Message::Text(json.into())).await;
        });
    }
}
