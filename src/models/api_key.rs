use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Credential used by the External Game API. `service_name` is matched
/// against a room's `current_game` (or an explicit whitelist) on every call;
/// `permissions` gates which endpoints the key may use.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub hashed_secret: String,
    pub service_name: String,
    pub game_id: Option<Uuid>,
    pub permissions: Vec<String>,
    pub rate_limit: Option<i32>,
    pub created_at: NaiveDateTime,
}

impl ApiKey {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission || p == "*")
    }

    /// A key may act on a room whose `current_game` matches its own
    /// `game_id`, or is whitelisted by service name alone (master/admin keys).
    pub fn authorized_for_game(&self, game_id: Option<Uuid>) -> bool {
        match self.game_id {
            Some(own) => Some(own) == game_id,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(game_id: Option<Uuid>, permissions: &[&str]) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            hashed_secret: "hashed".to_string(),
            service_name: "trivia-service".to_string(),
            game_id,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            rate_limit: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn has_permission_matches_exact_grant() {
        let k = key(None, &["rooms:read", "rooms:write"]);
        assert!(k.has_permission("rooms:read"));
        assert!(!k.has_permission("progress:write"));
    }

    #[test]
    fn wildcard_permission_grants_everything() {
        let k = key(None, &["*"]);
        assert!(k.has_permission("rooms:read"));
        assert!(k.has_permission("sessions:recover"));
    }

    #[test]
    fn scoped_key_only_authorized_for_its_own_game() {
        let game_a = Uuid::new_v4();
        let game_b = Uuid::new_v4();
        let k = key(Some(game_a), &["rooms:write"]);

        assert!(k.authorized_for_game(Some(game_a)));
        assert!(!k.authorized_for_game(Some(game_b)));
        assert!(!k.authorized_for_game(None));
    }

    #[test]
    fn unscoped_key_is_authorized_for_any_game() {
        let k = key(None, &["rooms:write"]);
        assert!(k.authorized_for_game(Some(Uuid::new_v4())));
        assert!(k.authorized_for_game(None));
    }
}
