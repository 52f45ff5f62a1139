//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Event names are kebab-case in the
//! `type` tag; payload fields are snake_case.

use serde::{Deserialize, Serialize};
use supportdesk_shared::{ConnectionId, RelayError, Role};

use crate::presence::OnlineUser;
use crate::session::{ChatMessage, SessionSummary};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join (and lazily create) a session; omitting the id asks the server for one
    JoinSession {
        #[serde(default)]
        session_id: Option<String>,
        display_name: String,
        #[serde(default)]
        role: Role,
    },

    /// Post a message to the bound session
    SendMessage {
        session_id: String,
        text: String,
        /// Informational; the connection's binding decides the author
        #[serde(default)]
        sender: Option<String>,
        #[serde(default)]
        role: Option<Role>,
    },

    TypingStart {
        session_id: String,
        display_name: String,
    },

    TypingStop {
        session_id: String,
        display_name: String,
    },

    /// Acknowledge every pending message in a session (owners only)
    MarkRead { session_id: String },

    /// Receive session summaries without joining a session
    OwnerSubscribe { display_name: String },

    /// Request the full session list
    GetSessions,

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { connection_id: ConnectionId },

    /// Full log replayed to a connection that just joined
    MessageHistory {
        session_id: String,
        messages: Vec<ChatMessage>,
    },

    /// New message appended to a session
    NewMessage {
        session_id: String,
        message: ChatMessage,
    },

    UserTyping {
        session_id: String,
        display_name: String,
        is_typing: bool,
    },

    /// Presence list for a session
    UsersOnline {
        session_id: String,
        users: Vec<OnlineUser>,
    },

    /// Summary delta pushed to owners
    SessionUpdated { session: SessionSummary },

    /// End-user message alert pushed to owners
    NewMessageNotification {
        session_id: String,
        message: ChatMessage,
        session: SessionSummary,
    },

    /// Full dashboard snapshot
    SessionsList { sessions: Vec<SessionSummary> },

    /// Heartbeat response
    Pong,

    /// Error local to the receiving connection
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &RelayError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Tag name, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::MessageHistory { .. } => "message-history",
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::UsersOnline { .. } => "users-online",
            ServerEvent::SessionUpdated { .. } => "session-updated",
            ServerEvent::NewMessageNotification { .. } => "new-message-notification",
            ServerEvent::SessionsList { .. } => "sessions-list",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}
