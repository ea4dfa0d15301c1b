//! Repository (§4.A): typed read/write access to durable entities. Each
//! aggregate gets its own `*Repository` struct wrapping a pool handle.

pub mod api_key;
pub mod event_log;
pub mod game;
pub mod player_session;
pub mod presence;
pub mod room;
pub mod room_member;
pub mod stats;
pub mod user;

pub use api_key::ApiKeyRepository;
pub use event_log::EventLogRepository;
pub use game::GameRepository;
pub use player_session::PlayerSessionRepository;
pub use presence::PresenceRepository;
pub use room::RoomRepository;
pub use room_member::RoomMemberRepository;
pub use stats::StatsRepository;
pub use user::UserRepository;
