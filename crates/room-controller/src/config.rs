//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables. Nothing here is
//! secret, so `Debug` is derived.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP + WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default per-connection outbound mailbox size.
pub const DEFAULT_CONNECTION_BUFFER: usize = 200;

/// Default idle room TTL in seconds (0 = rooms are retained forever).
pub const DEFAULT_IDLE_ROOM_TTL_SECONDS: u64 = 0;

/// Default generated room code length.
pub const DEFAULT_ROOM_CODE_LENGTH: usize = 7;

/// Bounds for generated room code length.
pub const MIN_ROOM_CODE_LENGTH: usize = 4;
pub const MAX_ROOM_CODE_LENGTH: usize = 32;

/// Default RC instance ID prefix.
pub const DEFAULT_RC_ID_PREFIX: &str = "rc";

/// Room Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP + WebSocket server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this RC instance.
    pub rc_id: String,

    /// Outbound mailbox capacity for each connection actor.
    pub connection_buffer: usize,

    /// Evict rooms that have been empty for this many seconds (0 disables).
    pub idle_room_ttl_seconds: u64,

    /// Length of codes handed out by `POST /v1/rooms`.
    pub room_code_length: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("RC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let connection_buffer = vars
            .get("RC_CONNECTION_BUFFER")
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_CONNECTION_BUFFER);

        let idle_room_ttl_seconds = vars
            .get("RC_IDLE_ROOM_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_IDLE_ROOM_TTL_SECONDS);

        // Unparseable falls back like the other numbers; out of range is an error.
        let room_code_length = vars
            .get("RC_ROOM_CODE_LENGTH")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_ROOM_CODE_LENGTH);
        if !(MIN_ROOM_CODE_LENGTH..=MAX_ROOM_CODE_LENGTH).contains(&room_code_length) {
            return Err(ConfigError::InvalidValue(format!(
                "RC_ROOM_CODE_LENGTH must be between {MIN_ROOM_CODE_LENGTH} and \
                 {MAX_ROOM_CODE_LENGTH}, got {room_code_length}"
            )));
        }

        // Generate RC instance ID
        let rc_id = vars.get("RC_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            rc_id,
            connection_buffer,
            idle_room_ttl_seconds,
            room_code_length,
        })
    }

    /// Idle room TTL, or `None` when eviction is disabled.
    #[must_use]
    pub fn idle_room_ttl(&self) -> Option<Duration> {
        (self.idle_room_ttl_seconds > 0).then(|| Duration::from_secs(self.idle_room_ttl_seconds))
    }
}
