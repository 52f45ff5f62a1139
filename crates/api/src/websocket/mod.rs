//! WebSocket support for real-time chat
//!
//! Provides the transport side of the relay:
//! - Connection registry (identity and session binding per connection)
//! - Scoped broadcast (session participants, all owners, single connection)
//! - Type-safe event definitions for client/server communication
//! - Axum WebSocket route handler
//!
//! # Architecture
//!
//! - **Connection**: A live socket with its outbound channel and binding
//! - **Registry**: All live connections, indexed by connection id
//! - **Broadcast**: Scope-aware fan-out over the registry
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Wire format for client/server communication

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod handler;
pub mod registry;

pub use handler::ws_handler;
pub use registry::ConnectionRegistry;
