use uuid::Uuid;

use crate::errors::AppError;
use crate::models::api_key::ApiKey;

/// ApiKey repository, backed by `api_keys`. Secrets are hashed before
/// comparison; this module never sees or stores a plaintext key.
pub struct ApiKeyRepository {
    pool: sqlx::PgPool,
}

impl ApiKeyRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_hashed_secret(&self, hashed: &str) -> Result<Option<ApiKey>, AppError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE hashed_secret = $1")
            .bind(hashed)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn find_by_service(&self, service_name: &str) -> Result<Vec<ApiKey>, AppError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE service_name = $1")
            .bind(service_name)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn create(
        &self,
        hashed_secret: &str,
        service_name: &str,
        game_id: Option<Uuid>,
        permissions: &[String],
        rate_limit: Option<i32>,
    ) -> Result<ApiKey, AppError> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, hashed_secret, service_name, game_id, permissions, rate_limit, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(hashed_secret)
        .bind(service_name)
        .bind(game_id)
        .bind(permissions)
        .bind(rate_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected() > 0)
    }
}
