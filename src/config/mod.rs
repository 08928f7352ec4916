//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::util::rate_limit::DEFAULT_MESSAGE_RATE_LIMIT;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; `None` allows any origin
    pub client_origin: Option<String>,
    /// Seed for spawn-point randomness; `None` seeds from entropy
    pub world_seed: Option<u64>,
    /// Inbound message ceiling per connection
    pub max_messages_per_second: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR for hosted deployments
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            world_seed: optional_parse("WORLD_SEED")?,

            max_messages_per_second: optional_parse("MAX_MESSAGES_PER_SECOND")?
                .unwrap_or(DEFAULT_MESSAGE_RATE_LIMIT),
        })
    }
}

/// Headless client configuration
#[derive(Clone, Debug)]
pub struct BotConfig {
    pub server_url: String,
    pub nickname: String,
    pub character_id: u8,
    pub log_level: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: env::var("BOT_SERVER_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:3000/ws".to_string()),
            nickname: env::var("BOT_NICKNAME").unwrap_or_else(|_| "Bot".to_string()),
            character_id: optional_parse("BOT_CHARACTER")?.unwrap_or(0),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn optional_parse<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
