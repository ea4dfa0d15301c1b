//! Top-level HTTP router: public liveness at the root, the External Game
//! API under `/external`, and the internal/admin surface under `/internal`.
//! The socket upgrade at `/ws` is mounted separately in `lib.rs`.

use crate::state::AppState;
use axum::Router;

pub mod external;
pub mod internal;
pub mod public;

pub fn create_http_routes(state: AppState) -> Router {
    Router::new()
        .merge(public::routes())
        .nest("/external", external::routes())
        .nest("/internal", internal::routes())
        .with_state(state)
}
