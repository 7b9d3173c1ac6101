//! Environment-driven configuration.

use std::env;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub presence_ttl: Duration,
    pub store_timeout: Duration,
    pub sweep_interval: Duration,
    pub banned_users: Vec<String>,
    pub log_level: String,
}

/// Room and matchmaking settings.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub capacity: usize,
    pub match_max_attempts: usize,
}

impl Config {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "5502".to_string())
                .parse()
                .unwrap_or(5502),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
            room: RoomConfig {
                capacity: env::var("ROOM_CAPACITY")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                match_max_attempts: env::var("MATCH_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .unwrap_or(4),
            },
            presence_ttl: Duration::from_secs(
                env::var("PRESENCE_TTL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
            ),
            store_timeout: Duration::from_millis(
                env::var("STORE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .unwrap_or(2000),
            ),
            sweep_interval: Duration::from_secs(
                env::var("SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            ),
            banned_users: env::var("BANNED_USERS")
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5502,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            room: RoomConfig {
                capacity: 3,
                match_max_attempts: 4,
            },
            presence_ttl: Duration::from_secs(86400),
            store_timeout: Duration::from_millis(2000),
            sweep_interval: Duration::from_secs(300),
            banned_users: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}
