//! Live-connection registry.
//!
//! Owned by the session gateway and shared with the broadcast relay.
//! Entries are opaque handles: a connection id, the authenticated
//! username, and the sender half of the connection's outbound queue.
//! Multiple live sessions for one username are allowed; the registry is
//! keyed by connection id, and all of a user's sessions receive broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use parley_core::ServerFrame;

/// A registered, authenticated connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub conn_id: u64,
    pub username: String,
    /// Sender for pushing frames to this connection's writer.
    pub sender: mpsc::Sender<ServerFrame>,
}

/// Registry of currently live, authenticated connections.
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<u64, ConnectionEntry>>>,
    next_conn_id: Arc<Mutex<u64>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_conn_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Register an authenticated connection; returns its connection id.
    pub async fn register(&self, username: String, sender: mpsc::Sender<ServerFrame>) -> u64 {
        let conn_id = {
            let mut next = self.next_conn_id.lock().await;
            let id = *next;
            *next += 1;
            id
        };

        let entry = ConnectionEntry {
            conn_id,
            username: username.clone(),
            sender,
        };
        self.connections.write().await.insert(conn_id, entry);

        info!(conn_id, username = %username, "connection registered");
        conn_id
    }

    /// Deregister a connection on disconnect.
    pub async fn deregister(&self, conn_id: u64) {
        if self.connections.write().await.remove(&conn_id).is_some() {
            debug!(conn_id, "connection deregistered");
        }
    }

    /// Snapshot of all live entries, safe to iterate while connections
    /// come and go.
    pub async fn snapshot(&self) -> Vec<ConnectionEntry> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}
