pub mod api_key;
pub mod event_log;
pub mod game;
pub mod keys;
pub mod player_session;
pub mod presence;
pub mod room;
pub mod room_member;
pub mod stats;
pub mod user;

pub use api_key::ApiKey;
pub use event_log::EventLog;
pub use game::GameDefinition;
pub use keys::{KeyPart, RedisKey};
pub use player_session::{PlayerSession, SessionStatus};
pub use presence::Presence;
pub use room::{Room, RoomStatus};
pub use room_member::{Location, MemberRole, RoomMember};
pub use stats::{Achievement, UserAchievement, UserStats};
pub use user::{PremiumTier, User, UserRole};
