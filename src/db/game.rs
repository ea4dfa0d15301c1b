use uuid::Uuid;

use crate::errors::AppError;
use crate::models::game::GameDefinition;

/// Game repository, backed by the `games` table. Read-mostly: game
/// definitions are provisioned out of band, never created by this core.
pub struct GameRepository {
    pool: sqlx::PgPool,
}

impl GameRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<GameDefinition>, AppError> {
        sqlx::query_as::<_, GameDefinition>("SELECT * FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<GameDefinition>, AppError> {
        sqlx::query_as::<_, GameDefinition>("SELECT * FROM games WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn list_active(&self) -> Result<Vec<GameDefinition>, AppError> {
        sqlx::query_as::<_, GameDefinition>(
            "SELECT * FROM games WHERE is_active = true ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn set_maintenance_mode(&self, id: Uuid, on: bool) -> Result<GameDefinition, AppError> {
        sqlx::query_as::<_, GameDefinition>(
            "UPDATE games SET maintenance_mode = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(on)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }
}
