//! Session state
//!
//! A session is an isolated conversation addressed by a string id. It owns its
//! message log, the set of connections currently bound to it and the unread
//! counter owners see on the dashboard.
//!
//! # Lifecycle
//!
//! `Created -> Active (participants > 0) <-> Inactive (participants == 0)`.
//! Transitions are driven only by the participant count; there is no terminal
//! state and sessions are never deleted.

pub mod log;
pub mod store;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use supportdesk_shared::{ConnectionId, MessageRole, Role};
use time::OffsetDateTime;

pub use log::{ChatMessage, MessageLog};
pub use store::SessionStore;

/// Label used while no end-user has joined a session
pub const OWNER_ONLY_LABEL: &str = "Support Agent";
/// Label used once more than one distinct end-user has joined
pub const MULTI_USER_LABEL: &str = "Multiple Users";
/// Sender name on join/leave notices
pub const SYSTEM_SENDER: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Inactive,
}

/// In-memory state of one conversation
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: OffsetDateTime,
    last_activity: OffsetDateTime,
    user_names: BTreeSet<String>,
    participants: HashSet<ConnectionId>,
    log: MessageLog,
    unread: usize,
    status: SessionStatus,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            user_names: BTreeSet::new(),
            participants: HashSet::new(),
            log: MessageLog::new(),
            unread: 0,
            status: SessionStatus::Created,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Display label derived from the end-users that have joined so far
    pub fn label(&self) -> String {
        let mut names = self.user_names.iter();
        match (names.next(), names.next()) {
            (None, _) => OWNER_ONLY_LABEL.to_string(),
            (Some(name), None) => name.clone(),
            (Some(_), Some(_)) => MULTI_USER_LABEL.to_string(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = OffsetDateTime::now_utc();
    }

    /// Remember who joined; only end-users shape the label
    pub fn note_identity(&mut self, display_name: &str, role: Role) {
        if role == Role::User && !self.user_names.contains(display_name) {
            self.user_names.insert(display_name.to_string());
        }
    }

    /// Returns false if the connection was already a participant
    pub fn add_participant(&mut self, connection_id: ConnectionId, display_name: &str, role: Role) -> bool {
        self.note_identity(display_name, role);
        self.touch();
        let inserted = self.participants.insert(connection_id);
        self.status = SessionStatus::Active;
        inserted
    }

    /// Returns false if the connection was not a participant
    pub fn remove_participant(&mut self, connection_id: &ConnectionId) -> bool {
        let removed = self.participants.remove(connection_id);
        if self.participants.is_empty() && self.status == SessionStatus::Active {
            self.status = SessionStatus::Inactive;
        }
        removed
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn append(&mut self, sender: &str, text: &str, role: MessageRole) -> ChatMessage {
        let message = self.log.append(sender, text, role);
        if role.counts_as_unread() {
            self.unread += 1;
        }
        self.touch();
        message
    }

    pub fn append_system(&mut self, text: &str) -> ChatMessage {
        self.append(SYSTEM_SENDER, text, MessageRole::System)
    }

    /// Acknowledge every pending message; returns how many were flagged
    pub fn mark_read(&mut self) -> usize {
        let changed = self.log.mark_all_read();
        self.unread = 0;
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn message_count(&self) -> usize {
        self.log.len()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.log.to_vec()
    }

    /// Recount unread messages straight from the log
    pub fn recount_unread(&self) -> usize {
        self.log.unread_count()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            label: self.label(),
            status: self.status,
            is_active: self.is_active(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            unread_count: self.unread,
            last_message: self.log.last().cloned(),
            message_count: self.log.len(),
            participant_count: self.participants.len(),
        }
    }
}

/// Read-only, owner-facing projection of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub label: String,
    pub status: SessionStatus,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    pub unread_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
    pub message_count: usize,
    pub participant_count: usize,
}

impl SessionSummary {
    /// Dashboard ordering: most unread first, then most recently active
    pub fn dashboard_cmp(&self, other: &Self) -> Ordering {
        other
            .unread_count
            .cmp(&self.unread_count)
            .then_with(|| other.last_activity.cmp(&self.last_activity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_participant_count() {
        let mut session = Session::new("s1");
        assert_eq!(session.status(), SessionStatus::Created);

        let a = ConnectionId::new();
        let b = ConnectionId::new();
        session.add_participant(a, "alice", Role::User);
        session.add_participant(b, "bob", Role::User);
        assert_eq!(session.status(), SessionStatus::Active);

        session.remove_participant(&a);
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.participant_count(), 1);

        session.remove_participant(&b);
        assert_eq!(session.status(), SessionStatus::Inactive);

        // Reactivates on a later join
        session.add_participant(ConnectionId::new(), "alice", Role::User);
        assert!(session.is_active());
    }

    #[test]
    fn test_label_tracks_end_users() {
        let mut session = Session::new("s1");
        assert_eq!(session.label(), OWNER_ONLY_LABEL);

        session.add_participant(ConnectionId::new(), "agent", Role::Owner);
        assert_eq!(session.label(), OWNER_ONLY_LABEL);

        session.add_participant(ConnectionId::new(), "alice", Role::User);
        assert_eq!(session.label(), "alice");

        session.add_participant(ConnectionId::new(), "alice", Role::User);
        assert_eq!(session.label(), "alice");

        session.add_participant(ConnectionId::new(), "bob", Role::User);
        assert_eq!(session.label(), MULTI_USER_LABEL);
    }

    #[test]
    fn test_unread_counter_matches_log() {
        let mut session = Session::new("s1");
        session.append("alice", "a", MessageRole::User);
        assert_eq!(session.unread_count(), session.recount_unread());
        session.append_system("alice joined the chat");
        session.append("agent", "b", MessageRole::Owner);
        session.append("alice", "c", MessageRole::User);
        assert_eq!(session.unread_count(), 2);
        assert_eq!(session.unread_count(), session.recount_unread());

        session.mark_read();
        assert_eq!(session.unread_count(), 0);
        assert_eq!(session.unread_count(), session.recount_unread());
    }

    #[test]
    fn test_dashboard_ordering() {
        let mut quiet = Session::new("quiet");
        quiet.append("alice", "old", MessageRole::User);
        let mut busy = Session::new("busy");
        busy.append("bob", "1", MessageRole::User);
        busy.append("bob", "2", MessageRole::User);
        let idle = Session::new("idle");

        let mut summaries = vec![idle.summary(), quiet.summary(), busy.summary()];
        summaries.sort_by(SessionSummary::dashboard_cmp);

        let order: Vec<_> = summaries.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(order, vec!["busy", "quiet", "idle"]);
    }
}
