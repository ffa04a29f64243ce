//! Runtime settings taken from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bot runtime settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Bot API token issued by @BotFather.
    pub bot_token: String,

    /// Path to the user registry file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Long-polling timeout for `getUpdates` in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Minimum interval between outbound messages in milliseconds.
    #[serde(default = "default_send_interval")]
    pub send_interval_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_send_interval() -> u64 {
    35 // stays under Telegram's ~30 messages per second
}

impl BotSettings {
    /// Creates settings with the given token and defaults for everything else.
    #[must_use]
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            database_path: default_database_path(),
            poll_timeout_secs: default_poll_timeout(),
            send_interval_ms: default_send_interval(),
        }
    }

    /// Creates settings from environment variables.
    ///
    /// Expects `BOT_TOKEN` to be set. `DATABASE_PATH`, `POLL_TIMEOUT_SECS`
    /// and `SEND_INTERVAL_MS` are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or a numeric value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let database_path = std::env::var("DATABASE_PATH")
            .map_or_else(|_| default_database_path(), PathBuf::from);

        Ok(Self {
            bot_token,
            database_path,
            poll_timeout_secs: parse_env_or("POLL_TIMEOUT_SECS", default_poll_timeout)?,
            send_interval_ms: parse_env_or("SEND_INTERVAL_MS", default_send_interval)?,
        })
    }

    /// Returns the long-polling timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Returns the minimum interval between outbound messages.
    #[must_use]
    pub const fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

impl std::fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotSettings")
            .field("bot_token", &"<redacted>")
            .field("database_path", &self.database_path)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("send_interval_ms", &self.send_interval_ms)
            .finish()
    }
}

fn parse_env_or(name: &'static str, default: fn() -> u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default()),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: '{value}' (must be a non-negative integer)")]
    InvalidNumber { name: &'static str, value: String },
}
