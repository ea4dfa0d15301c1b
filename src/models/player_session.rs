use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

/// Short-lived opaque credential binding a user (or a generic room slot, in
/// streamer mode) to a room and a game, used to re-enter without full
/// re-authentication against the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    pub id: Uuid,
    pub session_token: String,
    pub user_id: Option<Uuid>,
    pub room_id: Uuid,
    pub game_type: Uuid,
    pub streamer_mode: bool,
    pub status: SessionStatus,
    pub expires_at: NaiveDateTime,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
}

impl PlayerSession {
    /// A generic room session (`user_id = None`) is legal only for
    /// streamer-mode group returns; any other null-user row is a bug.
    pub fn is_generic(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn is_valid_now(&self) -> bool {
        self.status == SessionStatus::Active && self.expires_at > Utc::now().naive_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(status: SessionStatus, expires_at: NaiveDateTime) -> PlayerSession {
        PlayerSession {
            id: Uuid::new_v4(),
            session_token: "token".to_string(),
            user_id: Some(Uuid::new_v4()),
            room_id: Uuid::new_v4(),
            game_type: Uuid::new_v4(),
            streamer_mode: false,
            status,
            expires_at,
            metadata: serde_json::json!({}),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn active_and_unexpired_session_is_valid() {
        let future = Utc::now().naive_utc() + chrono::Duration::minutes(10);
        assert!(session(SessionStatus::Active, future).is_valid_now());
    }

    #[test]
    fn expired_timestamp_invalidates_an_active_session() {
        let past = Utc::now().naive_utc() - chrono::Duration::minutes(1);
        assert!(!session(SessionStatus::Active, past).is_valid_now());
    }

    #[test]
    fn revoked_session_is_invalid_even_before_its_expiry() {
        let future = Utc::now().naive_utc() + chrono::Duration::minutes(10);
        assert!(!session(SessionStatus::Revoked, future).is_valid_now());
    }

    #[test]
    fn generic_session_has_no_user_id() {
        let future = Utc::now().naive_utc() + chrono::Duration::minutes(10);
        let mut s = session(SessionStatus::Active, future);
        s.user_id = None;
        assert!(s.is_generic());
    }
}
