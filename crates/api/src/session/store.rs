//! Authoritative in-memory session map
//!
//! The map itself sits behind an `RwLock` that is taken for write only when a
//! new session is inserted. Each session has its own `Mutex`, so mutations to
//! one session never wait on another.

use std::collections::HashMap;
use std::sync::Arc;

use supportdesk_shared::{MessageRole, RelayError, RelayResult, Role};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{ChatMessage, Session, SessionSummary};

/// Shared handle to one session's state
pub type SessionHandle = Arc<Mutex<Session>>;

/// A session held locked after a mutation, so the caller can publish the
/// change before any other mutation of that session runs
pub type SessionGuard = OwnedMutexGuard<Session>;

/// Session-id -> session state
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the handle for an existing session
    pub async fn get(&self, session_id: &str) -> RelayResult<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Return the session, creating it with an empty log if it is unknown.
    /// An existing session only has its activity timestamp touched.
    pub async fn get_or_create(&self, session_id: &str, display_name: &str, role: Role) -> SessionHandle {
        if let Ok(handle) = self.get(session_id).await {
            handle.lock().await.touch();
            return handle;
        }

        let mut sessions = self.sessions.write().await;
        // Another join may have inserted it between the two locks
        if let Some(handle) = sessions.get(session_id) {
            let handle = Arc::clone(handle);
            drop(sessions);
            handle.lock().await.touch();
            return handle;
        }

        let mut session = Session::new(session_id);
        session.note_identity(display_name, role);
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));

        tracing::info!(
            session_id = %session_id,
            created_by = %display_name,
            role = %role,
            total_sessions = sessions.len(),
            "Session created"
        );

        handle
    }

    /// Append a message and return it with the session still locked
    pub async fn append_message(
        &self,
        session_id: &str,
        sender: &str,
        text: &str,
        role: MessageRole,
    ) -> RelayResult<(ChatMessage, SessionGuard)> {
        let mut session = self.get(session_id).await?.lock_owned().await;
        let message = session.append(sender, text, role);
        Ok((message, session))
    }

    /// Acknowledge every message in the session; calling twice is a no-op.
    /// Returns how many messages were flagged, with the session still locked.
    pub async fn mark_read(&self, session_id: &str) -> RelayResult<(usize, SessionGuard)> {
        let mut session = self.get(session_id).await?.lock_owned().await;
        let flagged = session.mark_read();
        Ok((flagged, session))
    }

    pub async fn snapshot(&self, session_id: &str) -> RelayResult<SessionSummary> {
        let handle = self.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session.summary())
    }

    pub async fn history(&self, session_id: &str) -> RelayResult<Vec<ChatMessage>> {
        let handle = self.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session.history())
    }

    /// Summaries of every session, most urgent first.
    ///
    /// Handles are cloned under the read lock and then locked one at a time,
    /// so the result is a point-in-time view per session and never holds up
    /// appends to sessions it is not currently reading.
    pub async fn list_all(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.lock().await.summary());
        }
        summaries.sort_by(SessionSummary::dashboard_cmp);
        summaries
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
