//! External Game API route table (§4.F), mounted under `/external`. Every
//! route resolves its own `GameApiAuth` from the `x-api-key` header; there is
//! no router-level auth layer because permission checks differ per endpoint.

use axum::Router;
use axum::routing::{get, post};

use crate::http::handlers::external_game;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms/{code}/validate", get(external_game::validate_room))
        .route("/rooms/{code}/players/{id}/status", post(external_game::push_player_status))
        .route("/rooms/{code}/bulk-status", post(external_game::bulk_update_status))
        .route("/rooms/{code}/players/{id}/heartbeat", post(external_game::player_heartbeat))
        .route("/rooms/{code}/game-end", post(external_game::game_end))
        .route("/rooms/{code}/return-all", post(external_game::return_all))
        .route("/rooms/{code}/abandon", post(external_game::abandon_room))
        .route("/sessions/recover", post(external_game::recover_session))
        .route("/progress/event", post(external_game::progress_event))
}
