use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Read-only projection of a remote game service, addressed by `base_url`
/// and identified by `game_id`. The core never runs game rules itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GameDefinition {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub min_players: i16,
    pub max_players: i16,
    pub is_active: bool,
    pub maintenance_mode: bool,
    pub settings_schema: serde_json::Value,
    pub default_settings: serde_json::Value,
}

impl GameDefinition {
    pub fn is_selectable(&self) -> bool {
        self.is_active && !self.maintenance_mode
    }

    /// Redirect URL template named in §4.D: `{base_url}?roomCode={code}&sessionToken={token}`.
    pub fn redirect_url(&self, room_code: &str, session_token: &str) -> String {
        format!(
            "{}?roomCode={}&sessionToken={}",
            self.base_url, room_code, session_token
        )
    }
}
