//! Session synchronization engine
//!
//! Applies client events to the registry, session store and presence tracker
//! and fans the results out through the broadcast router.
//!
//! Every mutation of a session runs under that session's mutex, and the
//! events it produces are enqueued before the mutex is released. Enqueueing
//! is an in-memory channel push (the socket writer task does the network
//! send), so every participant observes a session's messages in append order.
//!
//! Lock order is session -> presence -> registry. Nothing that holds a
//! registry or presence lock ever waits for a session.

use std::sync::Arc;
use std::time::Duration;

use supportdesk_shared::{generate_session_id, ConnectionId, MessageRole, RelayError, RelayResult, Role};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::dashboard::DashboardAggregator;
use crate::presence::{PresenceTracker, TypingChange, TypingExpiry, DEFAULT_TYPING_TIMEOUT};
use crate::session::{ChatMessage, SessionStore, SessionSummary};
use crate::websocket::broadcast::BroadcastRouter;
use crate::websocket::connection::{Binding, Connection};
use crate::websocket::events::{ClientEvent, ServerEvent};
use crate::websocket::registry::ConnectionRegistry;

/// Default upper bound on message length, in characters
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 5000;

/// Tunables for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub typing_timeout: Duration,
    pub max_message_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

/// Owns all relay state; cheap to clone
#[derive(Clone)]
pub struct ChatEngine {
    registry: Arc<ConnectionRegistry>,
    store: Arc<SessionStore>,
    presence: Arc<PresenceTracker>,
    router: Arc<BroadcastRouter>,
    dashboard: Arc<DashboardAggregator>,
    max_message_chars: usize,
}

impl ChatEngine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(SessionStore::new());
        let router = Arc::new(BroadcastRouter::new(Arc::clone(&registry)));
        let dashboard = Arc::new(DashboardAggregator::new(Arc::clone(&store), Arc::clone(&router)));

        Self {
            registry,
            store,
            presence: Arc::new(PresenceTracker::new(config.typing_timeout)),
            router,
            dashboard,
            max_message_chars: config.max_message_chars,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Register a transport connection and acknowledge it
    pub async fn connect(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> Arc<Connection> {
        let conn = self.registry.register(sender).await;
        let _ = conn.send(ServerEvent::Connected { connection_id: conn.id });
        conn
    }

    /// Apply a client event; failures go back to that connection only
    pub async fn handle(&self, connection_id: ConnectionId, event: ClientEvent) {
        if let Err(err) = self.dispatch(connection_id, event).await {
            tracing::warn!(
                connection_id = %connection_id,
                code = err.code(),
                error = %err,
                "Client event rejected"
            );
            let _ = self.router.to_connection(connection_id, ServerEvent::error(&err)).await;
        }
    }

    /// Report a malformed frame back to its connection
    pub async fn send_error(&self, connection_id: ConnectionId, message: &str) -> RelayResult<()> {
        let err = RelayError::Validation(message.to_string());
        self.router.to_connection(connection_id, ServerEvent::error(&err)).await
    }

    async fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> RelayResult<()> {
        use ClientEvent::*;

        match event {
            JoinSession {
                session_id,
                display_name,
                role,
            } => self.join(connection_id, session_id, &display_name, role).await.map(|_| ()),

            SendMessage {
                session_id,
                text,
                sender,
                role,
            } => {
                if sender.is_some() || role.is_some() {
                    tracing::trace!(
                        connection_id = %connection_id,
                        claimed_sender = ?sender,
                        claimed_role = ?role,
                        "Ignoring client-declared author; using session binding"
                    );
                }
                self.send_message(connection_id, &session_id, &text).await.map(|_| ())
            }

            TypingStart {
                session_id,
                display_name,
            } => self.set_typing(connection_id, &session_id, &display_name, true).await,

            TypingStop {
                session_id,
                display_name,
            } => self.set_typing(connection_id, &session_id, &display_name, false).await,

            MarkRead { session_id } => self.mark_read(connection_id, &session_id).await,

            OwnerSubscribe { display_name } => self.subscribe_owner(connection_id, &display_name).await,

            GetSessions => {
                let conn = self.registry.get(&connection_id).await?;
                if !conn.is_owner() {
                    return Err(RelayError::Forbidden("list sessions"));
                }
                self.dashboard.send_snapshot(connection_id).await
            }

            Ping => self.router.to_connection(connection_id, ServerEvent::Pong).await,
        }
    }

    /// Bind a connection to a session, creating the session if needed.
    /// Returns the session id, which the server picks when none is given.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        session_id: Option<String>,
        display_name: &str,
        role: Role,
    ) -> RelayResult<String> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(RelayError::Validation("display_name must not be empty".to_string()));
        }
        let session_id = match session_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_session_id(),
        };

        let conn = self.registry.get(&connection_id).await?;
        if let Some(existing) = conn.binding() {
            return Err(RelayError::AlreadyBound {
                connection_id,
                session_id: existing.session_id.clone(),
            });
        }
        drop(conn);

        let handle = self.store.get_or_create(&session_id, display_name, role).await;
        let mut session = handle.lock().await;

        // Bound only under the session lock: session broadcasts pick their
        // recipients from the registry, and nothing may reach the joiner
        // ahead of its history. Fails if a disconnect already removed it.
        self.registry.bind(connection_id, &session_id, display_name, role).await?;

        session.add_participant(connection_id, display_name, role);
        self.presence
            .add_participant(&session_id, connection_id, display_name, role)
            .await;

        // History first, so the joiner's own notice is not replayed twice
        let _ = self
            .router
            .to_connection(
                connection_id,
                ServerEvent::MessageHistory {
                    session_id: session_id.clone(),
                    messages: session.history(),
                },
            )
            .await;

        let notice = session.append_system(&format!("{display_name} joined the chat"));
        self.router
            .to_session(
                &session_id,
                ServerEvent::NewMessage {
                    session_id: session_id.clone(),
                    message: notice,
                },
            )
            .await;
        self.broadcast_online(&session_id).await;
        self.dashboard.publish(session.summary()).await;

        tracing::info!(
            connection_id = %connection_id,
            session_id = %session_id,
            display_name = %display_name,
            role = %role,
            participants = session.participant_count(),
            "Joined session"
        );

        Ok(session_id)
    }

    /// Append a message authored by the connection's bound identity
    pub async fn send_message(&self, connection_id: ConnectionId, session_id: &str, text: &str) -> RelayResult<ChatMessage> {
        if text.trim().is_empty() {
            return Err(RelayError::Validation("Message text must not be empty".to_string()));
        }
        if text.chars().count() > self.max_message_chars {
            return Err(RelayError::Validation(format!(
                "Message text exceeds {} characters",
                self.max_message_chars
            )));
        }

        let conn = self.registry.get(&connection_id).await?;
        let Some(binding) = conn.binding().filter(|b| b.session_id == session_id).cloned() else {
            if self.store.contains(session_id).await {
                return Err(RelayError::NotBound(connection_id));
            }
            return Err(RelayError::SessionNotFound(session_id.to_string()));
        };
        let role = MessageRole::from(binding.role);

        let message = {
            let (message, session) = self
                .store
                .append_message(session_id, &binding.display_name, text, role)
                .await?;

            self.router
                .to_session(
                    session_id,
                    ServerEvent::NewMessage {
                        session_id: session_id.to_string(),
                        message: message.clone(),
                    },
                )
                .await;

            let summary = session.summary();
            if role.counts_as_unread() {
                self.dashboard.publish(summary.clone()).await;
                self.dashboard.notify(summary, message.clone()).await;
            } else {
                self.dashboard.publish(summary).await;
            }
            message
        };

        tracing::debug!(
            connection_id = %connection_id,
            session_id = %session_id,
            message_id = message.id,
            role = %role,
            "Message appended"
        );

        // Sending a message ends the author's typing indicator
        if self.presence.set_typing(session_id, &binding.display_name, false).await == TypingChange::Stopped {
            self.broadcast_typing(session_id, Some(connection_id), &binding.display_name, false)
                .await;
        }

        Ok(message)
    }

    /// Start or stop the typing indicator for the connection's identity
    pub async fn set_typing(
        &self,
        connection_id: ConnectionId,
        session_id: &str,
        display_name: &str,
        is_typing: bool,
    ) -> RelayResult<()> {
        let conn = self.registry.get(&connection_id).await?;
        let binding = bound_to(&conn, session_id)?;
        if display_name != binding.display_name {
            tracing::trace!(
                connection_id = %connection_id,
                claimed = %display_name,
                bound = %binding.display_name,
                "Typing name differs from binding; using binding"
            );
        }
        let name = binding.display_name.clone();

        let change = self.presence.set_typing(session_id, &name, is_typing).await;
        if change.is_visible() {
            self.broadcast_typing(session_id, Some(connection_id), &name, is_typing)
                .await;
        }
        if let Some(generation) = change.generation() {
            self.arm_typing_expiry(session_id.to_string(), name, generation, connection_id);
        }
        Ok(())
    }

    /// Clear a typing indicator once refreshes stop arriving. One timer runs
    /// per start; refreshes move its deadline instead of spawning another.
    fn arm_typing_expiry(&self, session_id: String, display_name: String, generation: u64, connection_id: ConnectionId) {
        let presence = Arc::clone(&self.presence);
        let router = Arc::clone(&self.router);

        tokio::spawn(async move {
            let mut deadline = Instant::now() + presence.typing_timeout();
            loop {
                tokio::time::sleep_until(deadline).await;
                match presence.expire_typing(&session_id, &display_name, generation).await {
                    TypingExpiry::Extended(next) => deadline = next,
                    TypingExpiry::Stale => break,
                    TypingExpiry::Cleared => {
                        router
                            .to_session_except(
                                &session_id,
                                connection_id,
                                ServerEvent::UserTyping {
                                    session_id: session_id.clone(),
                                    display_name,
                                    is_typing: false,
                                },
                            )
                            .await;
                        break;
                    }
                }
            }
        });
    }

    /// Acknowledge a session's pending messages (owners only)
    pub async fn mark_read(&self, connection_id: ConnectionId, session_id: &str) -> RelayResult<()> {
        let conn = self.registry.get(&connection_id).await?;
        if !conn.is_owner() {
            return Err(RelayError::Forbidden("mark messages as read"));
        }
        let (flagged, session) = self.store.mark_read(session_id).await?;
        self.dashboard.publish(session.summary()).await;
        drop(session);

        tracing::debug!(
            connection_id = %connection_id,
            session_id = %session_id,
            flagged,
            "Marked session read"
        );
        Ok(())
    }

    /// Turn a connection into an owner dashboard feed and send it the snapshot
    pub async fn subscribe_owner(&self, connection_id: ConnectionId, display_name: &str) -> RelayResult<()> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(RelayError::Validation("display_name must not be empty".to_string()));
        }
        self.registry.subscribe_dashboard(connection_id, display_name).await?;
        self.dashboard.send_snapshot(connection_id).await
    }

    /// Tear down a connection after its transport closed
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let binding = match self.registry.unbind(connection_id).await {
            Ok(binding) => binding,
            Err(err) => {
                tracing::debug!(connection_id = %connection_id, reason = %err, "Disconnect without session");
                return;
            }
        };
        let session_id = binding.session_id.as_str();
        let Ok(handle) = self.store.get(session_id).await else {
            return;
        };

        let mut session = handle.lock().await;
        let was_participant = session.remove_participant(&connection_id);
        self.presence.remove_participant(session_id, connection_id).await;

        if !self.presence.is_name_online(session_id, &binding.display_name).await
            && self.presence.set_typing(session_id, &binding.display_name, false).await == TypingChange::Stopped
        {
            self.broadcast_typing(session_id, None, &binding.display_name, false).await;
        }

        if !was_participant {
            return;
        }

        let notice = session.append_system(&format!("{} left the chat", binding.display_name));
        self.router
            .to_session(
                session_id,
                ServerEvent::NewMessage {
                    session_id: session_id.to_string(),
                    message: notice,
                },
            )
            .await;
        self.broadcast_online(session_id).await;
        self.dashboard.publish(session.summary()).await;

        tracing::info!(
            connection_id = %connection_id,
            session_id = %session_id,
            display_name = %binding.display_name,
            remaining = session.participant_count(),
            status = ?session.status(),
            "Left session"
        );
    }

    // =========================================================================
    // Query surface
    // =========================================================================

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.dashboard.snapshot().await
    }

    pub async fn history(&self, session_id: &str) -> RelayResult<Vec<ChatMessage>> {
        self.store.history(session_id).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn broadcast_online(&self, session_id: &str) {
        let users = self.presence.list_online(session_id).await;
        self.router
            .to_session(
                session_id,
                ServerEvent::UsersOnline {
                    session_id: session_id.to_string(),
                    users,
                },
            )
            .await;
    }

    async fn broadcast_typing(&self, session_id: &str, excluded: Option<ConnectionId>, display_name: &str, is_typing: bool) {
        let event = ServerEvent::UserTyping {
            session_id: session_id.to_string(),
            display_name: display_name.to_string(),
            is_typing,
        };
        match excluded {
            Some(connection_id) => self.router.to_session_except(session_id, connection_id, event).await,
            None => self.router.to_session(session_id, event).await,
        };
    }
}

impl Default for ChatEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// The connection's binding, if it is bound to `session_id`
fn bound_to<'a>(conn: &'a Connection, session_id: &str) -> RelayResult<&'a Binding> {
    conn.binding()
        .filter(|b| b.session_id == session_id)
        .ok_or(RelayError::NotBound(conn.id))
}
