//! Connection registry
//!
//! Tracks every live connection, its declared identity and the session it is
//! bound to.

use std::collections::HashMap;
use std::sync::Arc;

use supportdesk_shared::{ConnectionId, RelayError, RelayResult, Role};
use tokio::sync::{mpsc, RwLock};

use super::connection::{Binding, Connection};
use super::events::ServerEvent;

/// Registry of all live connections
pub struct ConnectionRegistry {
    /// All active connections indexed by connection id
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection around its outbound channel
    pub async fn register(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(sender));
        let mut connections = self.connections.write().await;
        connections.insert(conn.id, Arc::clone(&conn));

        tracing::info!(
            connection_id = %conn.id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Bind a connection to a session for the rest of its lifetime
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        session_id: &str,
        display_name: &str,
        role: Role,
    ) -> RelayResult<Arc<Connection>> {
        let conn = self.get(&connection_id).await?;
        let binding = Binding {
            session_id: session_id.to_string(),
            display_name: display_name.to_string(),
            role,
        };
        match conn.bind(binding) {
            Ok(_) => Ok(conn),
            Err(existing) => Err(RelayError::AlreadyBound {
                connection_id,
                session_id: existing.session_id.clone(),
            }),
        }
    }

    /// Remove a connection and hand back its binding.
    ///
    /// The connection is dropped from the registry even when it never joined
    /// a session; that case reports `NotBound`.
    pub async fn unbind(&self, connection_id: ConnectionId) -> RelayResult<Binding> {
        let removed = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(&connection_id);
            if removed.is_some() {
                tracing::info!(
                    connection_id = %connection_id,
                    remaining_connections = connections.len(),
                    "WebSocket connection removed"
                );
            }
            removed
        };

        let conn = removed.ok_or(RelayError::NotRegistered(connection_id))?;
        conn.binding().cloned().ok_or(RelayError::NotBound(connection_id))
    }

    /// Mark a connection as an owner dashboard feed
    pub async fn subscribe_dashboard(
        &self,
        connection_id: ConnectionId,
        display_name: &str,
    ) -> RelayResult<Arc<Connection>> {
        let conn = self.get(&connection_id).await?;
        conn.subscribe_dashboard(display_name);
        Ok(conn)
    }

    /// Get a connection by ID
    pub async fn get(&self, connection_id: &ConnectionId) -> RelayResult<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .get(connection_id)
            .cloned()
            .ok_or(RelayError::NotRegistered(*connection_id))
    }

    /// Connections currently bound to a session
    pub async fn session_connections(&self, session_id: &str) -> Vec<Arc<Connection>> {
        self.filtered(|c| c.is_bound_to(session_id)).await
    }

    /// Connections in the owner scope
    pub async fn owner_connections(&self) -> Vec<Arc<Connection>> {
        self.filtered(Connection::is_owner).await
    }

    /// Snapshot of matching connections; the lock is released on return
    pub async fn filtered(&self, filter: impl Fn(&Connection) -> bool) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.values().filter(|c| filter(c)).cloned().collect()
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
