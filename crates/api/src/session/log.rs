//! Append-only message log owned by a single session

use serde::{Deserialize, Serialize};
use supportdesk_shared::MessageRole;
use time::OffsetDateTime;

/// A single chat message as stored and sent over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Strictly increasing within the owning session, starting at 1
    pub id: u64,
    pub sender: String,
    pub text: String,
    pub role: MessageRole,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub read_by_owner: bool,
}

/// Ordered message sequence; records are never removed or reordered
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message stamped with the server clock and the next id
    pub fn append(&mut self, sender: &str, text: &str, role: MessageRole) -> ChatMessage {
        self.next_id += 1;
        let message = ChatMessage {
            id: self.next_id,
            sender: sender.to_string(),
            text: text.to_string(),
            role,
            timestamp: OffsetDateTime::now_utc(),
            read_by_owner: !role.counts_as_unread(),
        };
        self.messages.push(message.clone());
        message
    }

    /// Flag every unread message as read, returning how many changed
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| !m.read_by_owner) {
            message.read_by_owner = true;
            changed += 1;
        }
        changed
    }

    /// Recount of messages still waiting for an owner
    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role.counts_as_unread() && !m.read_by_owner)
            .count()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}
