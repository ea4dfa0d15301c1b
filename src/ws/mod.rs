//! WebSocket transport (§4.B, §6): one socket per connection, upgraded at
//! `/ws`, speaking the `RoomClientMessage`/`RoomServerMessage` wire format.

pub mod broadcast;
pub mod handler;
pub mod messages;

use axum::{Router, routing::get};

use crate::state::AppState;

pub fn create_ws_routes(state: AppState) -> Router {
    Router::new().route("/ws", get(handler::upgrade)).with_state(state)
}
