//! Lobby Manager (§4.D) + Status Sync Manager (§4.E), built around one
//! `RoomActor` per live room (§5).

pub mod actor;
pub mod codegen;
pub mod ops;
pub mod snapshot;

pub use actor::{RoomActorRegistry, RoomCommand};
pub use snapshot::{Snapshot, VersionClock};
