//! Referral configuration and validation.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DEFAULT_REQUIRED_INVITES, TELEGRAM_LINK_BASE};

/// Errors that can occur while loading or validating the referral configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Channel at index {index} is not a valid handle or chat id: '{value}'")]
    InvalidChannel { index: usize, value: String },

    #[error("Duplicate channel found: {channel}")]
    DuplicateChannel { channel: String },

    #[error("No required channels configured")]
    NoChannels,

    #[error("required_invites must be greater than zero")]
    ZeroThreshold,

    #[error("unlock_channel_link must be an https:// link, got '{0}'")]
    InvalidUnlockLink(String),

    #[error("bot_entrypoint must be an https:// link, got '{0}'")]
    InvalidEntrypoint(String),

    #[error("bot_entrypoint is not configured and the bot has no username")]
    MissingEntrypoint,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// A channel users must follow, either a public `@handle` or a numeric chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    /// Creates a channel from a raw identifier.
    ///
    /// A bare handle gets its leading `@` added.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('@') || raw.starts_with('-') || raw.chars().all(|c| c.is_ascii_digit()) {
            Self(raw.to_owned())
        } else {
            Self(format!("@{raw}"))
        }
    }

    /// Returns the identifier as accepted by the Bot API `chat_id` parameter.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the public handle without the leading `@`, if this is a public channel.
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        self.0.strip_prefix('@')
    }

    /// Returns the public join URL for `@handle` channels.
    #[must_use]
    pub fn join_url(&self) -> Option<String> {
        self.handle().map(|h| format!("{TELEGRAM_LINK_BASE}/{h}"))
    }

    /// Checks whether the identifier is well formed.
    ///
    /// Handles follow Telegram's username rules (5-32 chars, letters, digits and
    /// underscores, starting with a letter); numeric ids must parse as `i64`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if let Some(handle) = self.handle() {
            let len = handle.chars().count();
            (5..=32).contains(&len)
                && handle.starts_with(|c: char| c.is_ascii_alphabetic())
                && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        } else {
            self.0.parse::<i64>().is_ok()
        }
    }
}

impl From<String> for Channel {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Referral settings: which channels gate access and what is unlocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// Channels every user must follow, checked in this order.
    pub required_channels: Vec<Channel>,

    /// Number of verified referrals needed to unlock the private channel.
    #[serde(default = "default_required_invites")]
    pub required_invites: u32,

    /// Invite link to the private channel.
    pub unlock_channel_link: String,

    /// Public bot link used to build referral links.
    /// Derived from the bot's username at startup when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_entrypoint: Option<String>,
}

fn default_required_invites() -> u32 {
    DEFAULT_REQUIRED_INVITES
}

impl ReferralConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.required_channels.is_empty() {
            return Err(ValidationError::NoChannels);
        }

        let mut seen = HashSet::new();
        for (index, channel) in self.required_channels.iter().enumerate() {
            if !channel.is_valid() {
                return Err(ValidationError::InvalidChannel {
                    index,
                    value: channel.to_string(),
                });
            }
            if !seen.insert(channel.as_str().to_lowercase()) {
                return Err(ValidationError::DuplicateChannel {
                    channel: channel.to_string(),
                });
            }
        }

        if self.required_invites == 0 {
            return Err(ValidationError::ZeroThreshold);
        }

        if !is_https_link(&self.unlock_channel_link) {
            return Err(ValidationError::InvalidUnlockLink(
                self.unlock_channel_link.clone(),
            ));
        }

        if let Some(entrypoint) = &self.bot_entrypoint
            && !is_https_link(entrypoint)
        {
            return Err(ValidationError::InvalidEntrypoint(entrypoint.clone()));
        }

        Ok(())
    }

    /// Fills in the bot entrypoint from the bot's username if none is configured.
    pub fn resolve_entrypoint(&mut self, bot_username: &str) {
        if self.bot_entrypoint.is_none() {
            self.bot_entrypoint = Some(format!("{TELEGRAM_LINK_BASE}/{bot_username}"));
        }
    }

    /// Creates an example configuration for users to reference.
    #[must_use]
    pub fn example() -> Self {
        Self {
            required_channels: vec![Channel::new("@english_avenue"), Channel::new("@ielts_bus")],
            required_invites: DEFAULT_REQUIRED_INVITES,
            unlock_channel_link: format!("{TELEGRAM_LINK_BASE}/+PrivateInviteHash"),
            bot_entrypoint: Some(format!("{TELEGRAM_LINK_BASE}/your_referral_bot")),
        }
    }
}

fn is_https_link(link: &str) -> bool {
    link.strip_prefix("https://").is_some_and(|rest| !rest.trim().is_empty())
}
