//! Scoped event fan-out
//!
//! Delivers events to one session's participants, to every owner, or to a
//! single connection. Delivery only enqueues onto each connection's channel;
//! a closed channel is logged and skipped so one dead socket never affects
//! the rest of the scope.

use std::sync::Arc;

use supportdesk_shared::{ConnectionId, RelayError, RelayResult};

use super::connection::Connection;
use super::events::ServerEvent;
use super::registry::ConnectionRegistry;

/// Routes events to the connections in a scope
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast an event to every connection bound to a session
    pub async fn to_session(&self, session_id: &str, event: ServerEvent) -> usize {
        let targets = self.registry.session_connections(session_id).await;
        deliver(&targets, event, session_id)
    }

    /// Broadcast to a session's participants other than `excluded`
    pub async fn to_session_except(&self, session_id: &str, excluded: ConnectionId, event: ServerEvent) -> usize {
        let targets = self
            .registry
            .filtered(|c| c.id != excluded && c.is_bound_to(session_id))
            .await;
        deliver(&targets, event, session_id)
    }

    /// Broadcast an event to every owner connection, bound or not
    pub async fn to_owners(&self, event: ServerEvent) -> usize {
        let targets = self.registry.owner_connections().await;
        deliver(&targets, event, "owners")
    }

    /// Targeted delivery to a single connection
    pub async fn to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> RelayResult<()> {
        let conn = self.registry.get(&connection_id).await?;
        conn.send(event).map_err(|_| {
            tracing::warn!(
                connection_id = %connection_id,
                "Failed to send event to connection (likely closed)"
            );
            RelayError::DeliveryFailure(connection_id)
        })
    }
}

/// Fan an event out, counting successful deliveries
fn deliver(targets: &[Arc<Connection>], event: ServerEvent, scope: &str) -> usize {
    let mut success_count = 0;
    let mut failed_count = 0;

    for conn in targets {
        match conn.send(event.clone()) {
            Ok(()) => success_count += 1,
            Err(_) => {
                failed_count += 1;
                let err = RelayError::DeliveryFailure(conn.id);
                tracing::warn!(
                    connection_id = %conn.id,
                    scope = %scope,
                    error = %err,
                    "Failed to send event to connection (likely closed)"
                );
            }
        }
    }

    tracing::debug!(
        scope = %scope,
        event_type = event.kind(),
        recipients = success_count,
        failed = failed_count,
        "Broadcast event"
    );

    success_count
}
