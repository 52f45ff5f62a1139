//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::engine::ChatEngine;

/// State handed to every HTTP and WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub engine: ChatEngine,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            engine: ChatEngine::new(config.engine()),
            config: Arc::new(config),
        }
    }
}
