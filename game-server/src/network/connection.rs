use game_types::ServerResponse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection not found")]
    NotFound,
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub username: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub sender: mpsc::Sender<ServerResponse>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        queue_depth: usize,
    ) -> (Self, mpsc::Receiver<ServerResponse>) {
        let (sender, receiver) = mpsc::channel(queue_depth);

        let connection = Self {
            id,
            peer,
            username: None,
            connected_at: Utc::now(),
            sender,
        };

        (connection, receiver)
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

}

/// Every open connection and the account each one is logged into.
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    user_to_connections: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            user_to_connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection and returns the queue its writer drains.
    /// At most `queue_depth` responses wait in that queue.
    pub async fn create_connection(
        &self,
        id: ConnectionId,
        peer: SocketAddr,
        queue_depth: usize,
    ) -> mpsc::Receiver<ServerResponse> {
        let (conn, receiver) = Connection::new(id, peer, queue_depth);

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        receiver
    }

    pub async fn remove_connection(&self, id: ConnectionId) -> Option<Connection> {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(&id)
        };

        if let Some(username) = removed.as_ref().and_then(|conn| conn.username.as_ref()) {
            self.unlink_user(username, id).await;
        }

        removed
    }

    /// Records which account `id` is logged into, or clears it.
    pub async fn set_connection_user(&self, id: ConnectionId, username: Option<String>) {
        let previous = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&id) {
                Some(connection) => {
                    if connection.username == username {
                        return;
                    }
                    std::mem::replace(&mut connection.username, username.clone())
                }
                None => return,
            }
        };

        if let Some(previous) = previous {
            self.unlink_user(&previous, id).await;
        }
        if let Some(username) = username {
            let mut user_to_connections = self.user_to_connections.write().await;
            user_to_connections.entry(username).or_default().insert(id);
        }
    }

    async fn unlink_user(&self, username: &str, id: ConnectionId) {
        let mut user_to_connections = self.user_to_connections.write().await;
        if let Some(ids) = user_to_connections.get_mut(username) {
            ids.remove(&id);
            if ids.is_empty() {
                user_to_connections.remove(username);
            }
        }
    }

    /// Queues `response` for the writer, waiting while the queue is full.
    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        response: ServerResponse,
    ) -> Result<(), SendError> {
        let sender = {
            let connections = self.connections.read().await;
            connections
                .get(&id)
                .map(|connection| connection.sender.clone())
                .ok_or(SendError::NotFound)?
        };
        sender.send(response).await.map_err(|_| SendError::Closed)
    }

    pub async fn connections_for_user(&self, username: &str) -> Vec<ConnectionId> {
        let user_to_connections = self.user_to_connections.read().await;
        user_to_connections
            .get(username)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn authenticated_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.values().filter(|c| c.is_authenticated()).count()
    }

    pub async fn user_connection_count(&self) -> usize {
        let user_connections = self.user_to_connections.read().await;
        user_connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
