//! Application configuration

use std::env;
use std::time::Duration;

use crate::engine::{EngineConfig, DEFAULT_MAX_MESSAGE_CHARS};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub client_url: String, // allowed CORS origin

    // Engine
    pub typing_timeout_ms: u64,
    pub max_message_chars: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            client_url: env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Engine
            typing_timeout_ms: positive("TYPING_TIMEOUT_MS", 1000)?,
            max_message_chars: positive_usize("MAX_MESSAGE_CHARS", DEFAULT_MAX_MESSAGE_CHARS)?,
        })
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            typing_timeout: Duration::from_millis(self.typing_timeout_ms),
            max_message_chars: self.max_message_chars,
        }
    }
}

/// Read a strictly positive integer, falling back to `default` when unset
fn positive(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::Invalid(key, raw)),
        },
    }
}

/// Like `positive`, for values that must also fit the platform's `usize`
fn positive_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    let value = positive(key, default as u64)?;
    usize::try_from(value).map_err(|_| ConfigError::Invalid(key, value.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?} (expected a positive integer)")]
    Invalid(&'static str, String),
}
