use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// The crate's single error currency. Every fallible operation, from a
/// repository call to a socket handler, resolves into one of these variants.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("room not found")]
    RoomNotFound,

    #[error("room is full")]
    RoomFull,

    #[error("room is not available")]
    RoomNotAvailable,

    #[error("invalid player name")]
    InvalidPlayerName,

    #[error("invalid room code")]
    InvalidRoomCode,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("wrong game type")]
    WrongGameType,

    #[error("wrong game session")]
    WrongGameSession,

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid session")]
    InvalidSession,

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal server error")]
    ServerError,

    #[error("room abandon failed")]
    RoomAbandonFailed,

    #[error("return-all failed")]
    ReturnAllFailed,

    #[error("bulk update failed")]
    BulkUpdateFailed,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("env error: {0}")]
    EnvError(String),

    #[error("redis error: {0}")]
    RedisError(String),

    #[error("redis command error: {0}")]
    RedisCommandError(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    RedisPoolError(String),

    #[error("jwt error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("upstream request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("database driver error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AppError {
    /// Fixed machine-readable code, matching the error taxonomy table.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::RoomNotFound => "ROOM_NOT_FOUND",
            AppError::RoomFull => "ROOM_FULL",
            AppError::RoomNotAvailable => "ROOM_NOT_AVAILABLE",
            AppError::InvalidPlayerName => "INVALID_PLAYER_NAME",
            AppError::InvalidRoomCode => "INVALID_ROOM_CODE",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidApiKey => "INVALID_API_KEY",
            AppError::WrongGameType => "WRONG_GAME_TYPE",
            AppError::WrongGameSession => "WRONG_GAME_SESSION",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::InvalidSession => "INVALID_SESSION",
            AppError::DatabaseError(_) | AppError::SqlxError(_) => "DATABASE_ERROR",
            AppError::ServerError
            | AppError::EnvError(_)
            | AppError::RedisError(_)
            | AppError::RedisCommandError(_)
            | AppError::RedisPoolError(_)
            | AppError::JwtError(_)
            | AppError::ReqwestError(_) => "SERVER_ERROR",
            AppError::RoomAbandonFailed => "ROOM_ABANDON_FAILED",
            AppError::ReturnAllFailed => "RETURN_ALL_FAILED",
            AppError::BulkUpdateFailed => "BULK_UPDATE_FAILED",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::RoomNotFound | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RoomFull
            | AppError::RoomNotAvailable
            | AppError::InvalidPlayerName
            | AppError::InvalidRoomCode
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::InvalidApiKey | AppError::InvalidSession => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) | AppError::WrongGameType | AppError::WrongGameSession => {
                StatusCode::FORBIDDEN
            }
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::DatabaseError(_)
            | AppError::SqlxError(_)
            | AppError::ServerError
            | AppError::EnvError(_)
            | AppError::RedisError(_)
            | AppError::RedisCommandError(_)
            | AppError::RedisPoolError(_)
            | AppError::JwtError(_)
            | AppError::ReqwestError(_)
            | AppError::RoomAbandonFailed
            | AppError::ReturnAllFailed
            | AppError::BulkUpdateFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Persistence/infra failures are logged with detail and surfaced generically;
    /// everything else is safe to echo back verbatim.
    fn public_message(&self) -> String {
        match self {
            AppError::DatabaseError(_)
            | AppError::SqlxError(_)
            | AppError::ServerError
            | AppError::EnvError(_)
            | AppError::RedisError(_)
            | AppError::RedisCommandError(_)
            | AppError::RedisPoolError(_)
            | AppError::JwtError(_)
            | AppError::ReqwestError(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> (StatusCode, ErrorBody) {
        if matches!(
            self,
            AppError::DatabaseError(_)
                | AppError::SqlxError(_)
                | AppError::ServerError
                | AppError::RedisError(_)
                | AppError::RedisCommandError(_)
                | AppError::RedisPoolError(_)
        ) {
            tracing::error!(error = %self, "internal failure");
        } else if matches!(
            self,
            AppError::InvalidApiKey | AppError::WrongGameType | AppError::WrongGameSession
        ) {
            tracing::warn!(error = %self, "cross-service trust violation");
        } else {
            tracing::info!(error = %self, "request rejected");
        }

        let details = if let AppError::RateLimited { retry_after_secs } = self {
            Some(serde_json::json!({ "retryAfterSecs": retry_after_secs }))
        } else {
            None
        };

        (
            self.status(),
            ErrorBody {
                success: false,
                error: self.public_message(),
                code: self.code(),
                timestamp: Utc::now().to_rfc3339(),
                details,
            },
        )
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.to_response();
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_service_trust_errors_map_to_forbidden() {
        for err in [AppError::WrongGameType, AppError::WrongGameSession, AppError::Forbidden("x".into())] {
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn infra_failures_hide_their_detail_from_the_public_message() {
        let err = AppError::SqlxError(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let (_, body) = err.to_response();
        assert_eq!(body.error, "internal server error");
        assert_eq!(body.code, "DATABASE_ERROR");
    }

    #[test]
    fn rate_limited_carries_retry_after_in_details() {
        let err = AppError::RateLimited { retry_after_secs: 42 };
        let (status, body) = err.to_response();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.details.unwrap()["retryAfterSecs"], 42);
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(AppError::RoomNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotFound("achievement".into()).status(), StatusCode::NOT_FOUND);
    }
}
