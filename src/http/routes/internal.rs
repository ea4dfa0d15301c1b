//! Internal/admin route table (§6), mounted under `/internal`. Every route
//! requires the `GAMEBUDDIES_API_KEY` master credential via `AdminAuth`.

use axum::Router;
use axum::routing::{get, post};

use crate::http::handlers::{health, internal};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/stats", get(internal::stats))
        .route("/rooms/{code}/sync", post(internal::sync_room_status))
}
