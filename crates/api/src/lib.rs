//! Supportdesk API Library
//!
//! Real-time support-chat relay: session state, presence, owner dashboard
//! feed and the WebSocket/HTTP surface around them.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod presence;
pub mod routes;
pub mod session;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use engine::{ChatEngine, EngineConfig};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
