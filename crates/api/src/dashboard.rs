//! Owner dashboard feed
//!
//! A derived view over the session store with no state of its own. Every
//! owner-visible mutation pushes the affected session's summary to all owner
//! connections; owners get a full snapshot when they subscribe and never
//! poll.

use std::sync::Arc;

use supportdesk_shared::{ConnectionId, RelayResult};

use crate::session::{ChatMessage, SessionStore, SessionSummary};
use crate::websocket::broadcast::BroadcastRouter;
use crate::websocket::events::ServerEvent;

pub struct DashboardAggregator {
    store: Arc<SessionStore>,
    router: Arc<BroadcastRouter>,
}

impl DashboardAggregator {
    pub fn new(store: Arc<SessionStore>, router: Arc<BroadcastRouter>) -> Self {
        Self { store, router }
    }

    /// Push a recomputed summary to every owner
    pub async fn publish(&self, summary: SessionSummary) -> usize {
        self.router.to_owners(ServerEvent::SessionUpdated { session: summary }).await
    }

    /// Alert owners about an end-user message
    pub async fn notify(&self, summary: SessionSummary, message: ChatMessage) -> usize {
        self.router
            .to_owners(ServerEvent::NewMessageNotification {
                session_id: summary.session_id.clone(),
                message,
                session: summary,
            })
            .await
    }

    /// Full list of summaries, most urgent first
    pub async fn snapshot(&self) -> Vec<SessionSummary> {
        self.store.list_all().await
    }

    /// Send the full snapshot to one connection
    pub async fn send_snapshot(&self, connection_id: ConnectionId) -> RelayResult<()> {
        let sessions = self.snapshot().await;
        tracing::debug!(
            connection_id = %connection_id,
            sessions = sessions.len(),
            "Sending dashboard snapshot"
        );
        self.router
            .to_connection(connection_id, ServerEvent::SessionsList { sessions })
            .await
    }
}
