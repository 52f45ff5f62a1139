//! Error types for the relay engine

use thiserror::Error;

use crate::types::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Connection not registered: {0}")]
    NotRegistered(ConnectionId),

    #[error("Connection has not joined a session: {0}")]
    NotBound(ConnectionId),

    #[error("Connection already joined session {session_id}")]
    AlreadyBound {
        connection_id: ConnectionId,
        session_id: String,
    },

    #[error("Only owners may {0}")]
    Forbidden(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Delivery to connection {0} failed")]
    DeliveryFailure(ConnectionId),
}

impl RelayError {
    /// Stable machine-readable code sent to clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            RelayError::NotRegistered(_) => "NOT_REGISTERED",
            RelayError::NotBound(_) => "NOT_BOUND",
            RelayError::AlreadyBound { .. } => "ALREADY_BOUND",
            RelayError::Forbidden(_) => "FORBIDDEN",
            RelayError::Validation(_) => "VALIDATION_ERROR",
            RelayError::DeliveryFailure(_) => "DELIVERY_FAILURE",
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
