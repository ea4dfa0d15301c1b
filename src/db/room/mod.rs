use sqlx::PgPool;

pub use read::RoomWithMembers;

mod create;
mod delete;
mod read;
mod update;

/// Room repository, backed by the `rooms` table.
pub struct RoomRepository {
    pool: PgPool,
}

impl RoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
