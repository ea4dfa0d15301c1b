use uuid::Uuid;

use crate::errors::AppError;

use super::RoomRepository;

impl RoomRepository {
    /// Rooms are never deleted in normal operation, only transitioned to
    /// `abandoned`/`finished`. No retention SLA is named for terminal rooms,
    /// so nothing calls this automatically; it's here for an operator-driven
    /// purge, guarded by the status check so a live room can't be deleted.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = $1 AND status IN ('abandoned', 'finished')")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected() > 0)
    }

    #[cfg(debug_assertions)]
    pub async fn delete_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM rooms")
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }
}
