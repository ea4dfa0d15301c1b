use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{PremiumTier, User, UserRole};

/// User repository, backed by the `users` table. Rows are a local cache of
/// the identity provider's record, upserted on every verified bearer token.
pub struct UserRepository {
    pool: sqlx::PgPool,
}

impl UserRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::SqlxError)
    }

    /// Upserts the identity-provider projection on sync; `xp`/`level` are
    /// owned by the stats ingestion path and are never touched here.
    pub async fn upsert_from_identity(
        &self,
        id: Uuid,
        username: &str,
        display_name: &str,
        avatar_url: Option<&str>,
        is_guest: bool,
        now: NaiveDateTime,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, username, display_name, avatar_url, role, is_guest,
                premium_tier, xp, level, last_seen, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 1, $8, $8)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                avatar_url = EXCLUDED.avatar_url,
                is_guest = EXCLUDED.is_guest,
                last_seen = EXCLUDED.last_seen
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(display_name)
        .bind(avatar_url)
        .bind(UserRole::User)
        .bind(is_guest)
        .bind(PremiumTier::Free)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::SqlxError)
    }

    pub async fn touch_last_seen(&self, id: Uuid, now: NaiveDateTime) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(())
    }

    #[cfg(debug_assertions)]
    pub async fn delete_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await
            .map_err(AppError::SqlxError)?;
        Ok(result.rows_affected())
    }
}
