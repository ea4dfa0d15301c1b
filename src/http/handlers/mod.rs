//! HTTP handlers: health, the External Game API (§4.F), and the
//! internal/admin surface (§6).

pub mod external_game;
pub mod health;
pub mod internal;
