use crate::http::handlers::health;
use crate::state::AppState;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

/// Public routes: no authentication or rate limiting. Liveness plus a
/// minimal service banner, the ambient concern of being able to curl the
/// root and get back something meaningful regardless of feature non-goals.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/", get(root_handler))
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "room-session-core",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
