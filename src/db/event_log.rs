use uuid::Uuid;

use crate::errors::AppError;
use crate::models::event_log::{EventLog, RETENTION_DAYS};

/// EventLog repository, backed by `event_logs`. Writes are fire-and-forget
/// from the caller's perspective: a failed log write never fails the
/// operation it is describing.
pub struct EventLogRepository {
    pool: sqlx::PgPool,
}

impl EventLogRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(
        &self,
        room_id: Uuid,
        user_id: Option<Uuid>,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<EventLog, AppError> {
        sqlx::query_as::<_, EventLog>(
            r#"
            INSERT INTO event_logs (id, room_id, user_id, event_type, event_data, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_id)
        .bind(user_id)
        .bind(event_type)
        .bind(event_data)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn list_for_room(&self, room_id: Uuid, limit: i64) -> Result<Vec<EventLog>, AppError> {
        sqlx::query_as::<_, EventLog>(
            "SELECT * FROM event_logs WHERE room_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    /// Retention sweep: drops anything older than `RETENTION_DAYS`.
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM event_logs WHERE created_at < now() - ($1 || ' days')::interval",
        )
        .bind(RETENTION_DAYS)
        .execute(&self.pool)
        .await
        .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }
}
