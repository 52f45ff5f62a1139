//! WebSocket connection management
//!
//! Represents a live transport connection and the session it is bound to.

use std::sync::OnceLock;

use supportdesk_shared::{ConnectionId, Role};
use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Identity declared when a connection joins a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub session_id: String,
    pub display_name: String,
    pub role: Role,
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this connection
    pub id: ConnectionId,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Session binding, set once on join and fixed for the connection's lifetime
    binding: OnceLock<Binding>,

    /// Owner name when subscribed to the dashboard feed
    dashboard: OnceLock<String>,
}

impl Connection {
    /// Create a new, unbound connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
            binding: OnceLock::new(),
            dashboard: OnceLock::new(),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if queued, Err if the connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Bind to a session. Hands back the existing binding if already bound.
    pub fn bind(&self, binding: Binding) -> Result<&Binding, &Binding> {
        let mut fresh = false;
        let stored = self.binding.get_or_init(|| {
            fresh = true;
            binding
        });
        if fresh {
            tracing::debug!(
                connection_id = %self.id,
                session_id = %stored.session_id,
                role = %stored.role,
                "Connection bound to session"
            );
            Ok(stored)
        } else {
            Err(stored)
        }
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.get()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.binding.get().map(|b| b.session_id.as_str())
    }

    pub fn is_bound_to(&self, session_id: &str) -> bool {
        self.session_id() == Some(session_id)
    }

    /// Mark this connection as an owner dashboard feed (idempotent)
    pub fn subscribe_dashboard(&self, display_name: &str) {
        if self.dashboard.set(display_name.to_string()).is_ok() {
            tracing::debug!(
                connection_id = %self.id,
                owner = %display_name,
                "Subscribed to dashboard feed"
            );
        }
    }

    pub fn is_dashboard_subscriber(&self) -> bool {
        self.dashboard.get().is_some()
    }

    /// Owners are connections bound with the owner role or dashboard subscribers
    pub fn is_owner(&self) -> bool {
        self.is_dashboard_subscriber() || self.binding().is_some_and(|b| b.role.is_owner())
    }
}
