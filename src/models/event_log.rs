use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Append-only audit trail. Retention is capped at 30 days by the periodic
/// sweeper; nothing in the core reads old rows back for logic.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: NaiveDateTime,
}

pub const RETENTION_DAYS: i64 = 30;
