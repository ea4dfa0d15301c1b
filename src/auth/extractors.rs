//! Auth extractors: `AuthUser` verifies an identity-provider bearer token
//! for client HTTP/WS traffic; `GameApiAuth` resolves an `x-api-key` header
//! to an `ApiKey` row for the External Game API (§4.F).

use axum::extract::{FromRequestParts, Query};
use axum::http::{header::AUTHORIZATION, request::Parts};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::jwt::verify_identity_token;
use crate::db::api_key::ApiKeyRepository;
use crate::db::user::UserRepository;
use crate::errors::AppError;
use crate::models::api_key::ApiKey;
use crate::state::AppState;

/// An authenticated client, resolved from a verified identity-provider
/// bearer token. Upserts/touches the local `users` projection on every use.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

#[derive(Debug, Deserialize)]
struct WsAuthQuery {
    token: Option<String>,
}

async fn resolve_user(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let claims = verify_identity_token(&state.config.identity_jwt_secret, token)?;
    let now = chrono::Utc::now().naive_utc();
    let user_repo = UserRepository::new(state.postgres.clone());
    user_repo
        .upsert_from_identity(
            claims.sub,
            claims.username.as_deref().unwrap_or("guest"),
            claims.display_name.as_deref().unwrap_or("Guest"),
            claims.avatar_url.as_deref(),
            claims.is_guest,
            now,
        )
        .await?;
    Ok(AuthUser { user_id: claims.sub })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        resolve_user(state, &token).await
    }
}

/// WebSocket upgrade requests can't always set custom headers from browser
/// clients, so the socket-auth path also accepts `?token=` on the upgrade
/// URL, falling back to the `Authorization` header when present.
impl FromRequestParts<AppState> for crate::auth::WsAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(parts) {
            return resolve_user(state, &token).await.map(crate::auth::WsAuth);
        }

        let Query(query) = Query::<WsAuthQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized("missing auth token".into()))?;
        let token = query.token.ok_or_else(|| AppError::Unauthorized("missing auth token".into()))?;
        resolve_user(state, &token).await.map(crate::auth::WsAuth)
    }
}

/// Master credential for the internal/admin surface (§6): a single
/// `GAMEBUDDIES_API_KEY`, distinct from the per-game `api_keys` table used by
/// the External Game API.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get("x-gamebuddies-key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing admin key".into()))?;

        if provided != state.config.gamebuddies_api_key {
            return Err(AppError::Unauthorized("invalid admin key".into()));
        }
        Ok(AdminAuth)
    }
}

/// External Game API credential (§4.F): `x-api-key` hashed and matched
/// against the `api_keys` table. Permission + service/game matching is left
/// to each handler, since the required permission differs per endpoint.
#[derive(Debug, Clone)]
pub struct GameApiAuth(pub ApiKey);

fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

impl FromRequestParts<AppState> for GameApiAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::InvalidApiKey)?;

        let hashed = hash_api_key(raw);
        let key = ApiKeyRepository::new(state.postgres.clone())
            .find_by_hashed_secret(&hashed)
            .await?
            .ok_or(AppError::InvalidApiKey)?;

        Ok(GameApiAuth(key))
    }
}
