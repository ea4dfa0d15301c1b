//! Connection Manager (§4.B): maps transport-level socket IDs to user IDs and
//! room codes, and tracks liveness. This is the only mutable process-wide
//! state in the crate; every other component treats it as a rebuildable
//! cache, never reaching it through an ambient global (Design Notes, §9).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::{NaiveDateTime, Utc};
use futures::stream::SplitSink;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type Sender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Clone)]
pub struct ConnectionInfo {
    pub socket_id: Uuid,
    pub user_id: Uuid,
    pub room_code: String,
    pub connected_at: NaiveDateTime,
    pub sender: Sender,
}

#[derive(Default)]
struct Indices {
    by_room: HashMap<String, HashSet<Uuid>>,
    by_user: HashMap<Uuid, HashSet<Uuid>>,
}

impl Indices {
    fn insert(&mut self, conn: &ConnectionInfo) {
        self.by_room
            .entry(conn.room_code.clone())
            .or_default()
            .insert(conn.socket_id);
        self.by_user
            .entry(conn.user_id)
            .or_default()
            .insert(conn.socket_id);
    }

    fn remove(&mut self, conn: &ConnectionInfo) {
        if let Some(set) = self.by_room.get_mut(&conn.room_code) {
            set.remove(&conn.socket_id);
            if set.is_empty() {
                self.by_room.remove(&conn.room_code);
            }
        }
        if let Some(set) = self.by_user.get_mut(&conn.user_id) {
            set.remove(&conn.socket_id);
            if set.is_empty() {
                self.by_user.remove(&conn.user_id);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub active_rooms: usize,
    pub active_users: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct UserConnection {
    pub socket_id: Uuid,
    pub room_code: String,
}

/// Authoritative, in-memory mapping. Held behind a single mutex the way the
/// ambient stack's `Connections`/`ConnectionIndices` pair is held — a
/// coarse-grained lock is acceptable because every critical section here is
/// a handful of hash-map operations, never a suspension point.
#[derive(Clone)]
pub struct ConnectionManager {
    connections: Arc<Mutex<HashMap<Uuid, ConnectionInfo>>>,
    indices: Arc<Mutex<Indices>>,
    max_conn_per_user: usize,
}

impl ConnectionManager {
    pub fn new(max_conn_per_user: usize) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            indices: Arc::new(Mutex::new(Indices::default())),
            max_conn_per_user,
        }
    }

    /// Idempotent: registering the same socket_id twice updates its mapping
    /// rather than creating a duplicate entry. Rejects registration once a
    /// user already holds `max_conn_per_user` live sockets.
    pub async fn register(
        &self,
        socket_id: Uuid,
        user_id: Uuid,
        room_code: String,
        sender: Sender,
    ) -> Result<(), crate::errors::AppError> {
        let mut connections = self.connections.lock().await;
        let mut indices = self.indices.lock().await;

        if let Some(existing) = connections.get(&socket_id) {
            indices.remove(existing);
        } else if indices
            .by_user
            .get(&user_id)
            .map(|s| s.len())
            .unwrap_or(0)
            >= self.max_conn_per_user
        {
            return Err(crate::errors::AppError::RateLimited {
                retry_after_secs: 0,
            });
        }

        let info = ConnectionInfo {
            socket_id,
            user_id,
            room_code,
            connected_at: Utc::now().naive_utc(),
            sender,
        };
        indices.insert(&info);
        connections.insert(socket_id, info);
        Ok(())
    }

    /// Removes mappings and returns `(userId, roomCode)` that was attached,
    /// for the caller to hand to the Status Sync Manager.
    pub async fn disconnect(&self, socket_id: Uuid) -> Option<(Uuid, String)> {
        let mut connections = self.connections.lock().await;
        let mut indices = self.indices.lock().await;
        let info = connections.remove(&socket_id)?;
        indices.remove(&info);
        Some((info.user_id, info.room_code))
    }

    pub async fn get_user_connections(&self, user_id: Uuid) -> Vec<UserConnection> {
        let connections = self.connections.lock().await;
        let indices = self.indices.lock().await;
        indices
            .by_user
            .get(&user_id)
            .map(|sockets| {
                sockets
                    .iter()
                    .filter_map(|id| connections.get(id))
                    .map(|c| UserConnection {
                        socket_id: c.socket_id,
                        room_code: c.room_code.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn get_room_sockets(&self, room_code: &str) -> Vec<(Uuid, Sender)> {
        let connections = self.connections.lock().await;
        let indices = self.indices.lock().await;
        indices
            .by_room
            .get(room_code)
            .map(|sockets| {
                sockets
                    .iter()
                    .filter_map(|id| connections.get(id))
                    .map(|c| (c.user_id, c.sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn get_user_sockets_in_room(&self, room_code: &str, user_id: Uuid) -> Vec<Sender> {
        let connections = self.connections.lock().await;
        let indices = self.indices.lock().await;
        indices
            .by_room
            .get(room_code)
            .map(|sockets| {
                sockets
                    .iter()
                    .filter_map(|id| connections.get(id))
                    .filter(|c| c.user_id == user_id)
                    .map(|c| c.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forcibly closes every socket a user holds within a room (used by
    /// `kickPlayer`); callers still receive a `disconnect` for each socket
    /// through the normal read loop teardown.
    pub async fn socket_ids_for_user_in_room(&self, room_code: &str, user_id: Uuid) -> Vec<Uuid> {
        let connections = self.connections.lock().await;
        let indices = self.indices.lock().await;
        indices
            .by_room
            .get(room_code)
            .map(|sockets| {
                sockets
                    .iter()
                    .filter(|id| connections.get(id).map(|c| c.user_id) == Some(user_id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> ConnectionStats {
        let connections = self.connections.lock().await;
        let indices = self.indices.lock().await;
        ConnectionStats {
            total_connections: connections.len(),
            active_rooms: indices.by_room.len(),
            active_users: indices.by_user.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_empty() {
        let mgr = ConnectionManager::new(8);
        let stats = mgr.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_rooms, 0);
        assert_eq!(stats.active_users, 0);
    }

    #[tokio::test]
    async fn disconnect_of_unknown_socket_returns_none() {
        let mgr = ConnectionManager::new(8);
        assert!(mgr.disconnect(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn unknown_user_has_no_connections() {
        let mgr = ConnectionManager::new(8);
        assert!(mgr.get_user_connections(Uuid::new_v4()).await.is_empty());
    }
}
