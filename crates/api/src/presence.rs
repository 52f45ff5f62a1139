//! Presence and typing tracker
//!
//! Ephemeral per-session state: who is connected and who is typing. Nothing
//! here touches the message log and all of it is lost on disconnect.
//!
//! Each typing entry holds a deadline and the generation it was started
//! with. A refresh only pushes the deadline out; the single timer armed on
//! start keeps sleeping until the deadline stops moving. A timer whose
//! generation is no longer current (the typist stopped and started again)
//! exits without touching the newer entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use supportdesk_shared::{ConnectionId, Role};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Default server-side typing expiry
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(1);

/// A connection currently present in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub role: Role,
}

/// Outcome of a typing update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingChange {
    /// Indicator switched on; arm one expiry timer with this generation
    Started { generation: u64 },
    /// Already typing; the deadline moved and the running timer picks it up
    Refreshed,
    /// Indicator switched off
    Stopped,
    /// Nothing changed
    Unchanged,
}

/// What an expiry timer should do when it wakes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingExpiry {
    /// The entry was cleared; tell the session
    Cleared,
    /// Refreshed in the meantime; sleep until the new deadline
    Extended(Instant),
    /// The entry is gone or belongs to a newer start
    Stale,
}

impl TypingChange {
    /// Generation to arm a timer with, only on a fresh start
    pub fn generation(&self) -> Option<u64> {
        match self {
            TypingChange::Started { generation } => Some(*generation),
            _ => None,
        }
    }

    /// Whether the other participants need to hear about it
    pub fn is_visible(&self) -> bool {
        matches!(self, TypingChange::Started { .. } | TypingChange::Stopped)
    }
}

#[derive(Debug, Clone, Copy)]
struct TypingEntry {
    generation: u64,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct SessionPresence {
    online: HashMap<ConnectionId, OnlineUser>,
    /// display name -> current typing entry
    typing: HashMap<String, TypingEntry>,
}

pub struct PresenceTracker {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionPresence>>>>,
    next_generation: AtomicU64,
    typing_timeout: Duration,
}

impl PresenceTracker {
    pub fn new(typing_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            typing_timeout,
        }
    }

    pub fn typing_timeout(&self) -> Duration {
        self.typing_timeout
    }

    async fn entry(&self, session_id: &str) -> Arc<Mutex<SessionPresence>> {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            return Arc::clone(entry);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionPresence::default()))),
        )
    }

    async fn existing(&self, session_id: &str) -> Option<Arc<Mutex<SessionPresence>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn add_participant(&self, session_id: &str, connection_id: ConnectionId, display_name: &str, role: Role) {
        let entry = self.entry(session_id).await;
        let mut presence = entry.lock().await;
        presence.online.insert(
            connection_id,
            OnlineUser {
                connection_id,
                display_name: display_name.to_string(),
                role,
            },
        );
        tracing::debug!(
            session_id = %session_id,
            connection_id = %connection_id,
            online = presence.online.len(),
            "Participant online"
        );
    }

    pub async fn remove_participant(&self, session_id: &str, connection_id: ConnectionId) -> Option<OnlineUser> {
        let entry = self.existing(session_id).await?;
        let mut presence = entry.lock().await;
        let removed = presence.online.remove(&connection_id);
        if removed.is_some() {
            tracing::debug!(
                session_id = %session_id,
                connection_id = %connection_id,
                online = presence.online.len(),
                "Participant offline"
            );
        }
        removed
    }

    /// Online participants ordered by display name
    pub async fn list_online(&self, session_id: &str) -> Vec<OnlineUser> {
        let Some(entry) = self.existing(session_id).await else {
            return Vec::new();
        };
        let presence = entry.lock().await;
        let mut users: Vec<OnlineUser> = presence.online.values().cloned().collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.role.as_str().cmp(b.role.as_str())));
        users
    }

    /// Whether some other connection in the session uses this display name
    pub async fn is_name_online(&self, session_id: &str, display_name: &str) -> bool {
        let Some(entry) = self.existing(session_id).await else {
            return false;
        };
        let presence = entry.lock().await;
        presence.online.values().any(|u| u.display_name == display_name)
    }

    pub async fn set_typing(&self, session_id: &str, display_name: &str, is_typing: bool) -> TypingChange {
        let entry = self.entry(session_id).await;
        let mut presence = entry.lock().await;

        if is_typing {
            let deadline = Instant::now() + self.typing_timeout;
            if let Some(current) = presence.typing.get_mut(display_name) {
                current.deadline = deadline;
                return TypingChange::Refreshed;
            }
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            presence
                .typing
                .insert(display_name.to_string(), TypingEntry { generation, deadline });
            TypingChange::Started { generation }
        } else if presence.typing.remove(display_name).is_some() {
            TypingChange::Stopped
        } else {
            TypingChange::Unchanged
        }
    }

    /// Called by the timer armed with `generation` when it wakes up. Clears
    /// the entry once its deadline has passed.
    pub async fn expire_typing(&self, session_id: &str, display_name: &str, generation: u64) -> TypingExpiry {
        let Some(entry) = self.existing(session_id).await else {
            return TypingExpiry::Stale;
        };
        let mut presence = entry.lock().await;
        let current = match presence.typing.get(display_name) {
            Some(current) if current.generation == generation => *current,
            _ => return TypingExpiry::Stale,
        };
        if current.deadline > Instant::now() {
            return TypingExpiry::Extended(current.deadline);
        }

        presence.typing.remove(display_name);
        tracing::debug!(
            session_id = %session_id,
            display_name = %display_name,
            "Typing indicator expired"
        );
        TypingExpiry::Cleared
    }

    /// Display names currently typing, sorted
    pub async fn typing(&self, session_id: &str) -> Vec<String> {
        let Some(entry) = self.existing(session_id).await else {
            return Vec::new();
        };
        let presence = entry.lock().await;
        let mut names: Vec<String> = presence.typing.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TIMEOUT)
    }
}
