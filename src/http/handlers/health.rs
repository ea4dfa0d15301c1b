//! `GET /health`, `/internal/health` (§6): liveness plus a dependency ping.
//! Carried as an ambient concern regardless of the spec's feature Non-goals.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub postgres: bool,
    pub redis: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let postgres = sqlx::query("SELECT 1").execute(&state.postgres).await.is_ok();

    let redis = match state.redis.get().await {
        Ok(mut conn) => redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .is_ok(),
        Err(_) => false,
    };

    let status = if postgres && redis { "ok" } else { "degraded" };
    Json(HealthResponse { status, postgres, redis })
}
