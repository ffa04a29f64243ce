//! User record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user identity.
///
/// For private chats the chat id equals the user id, so this also addresses
/// outbound messages to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when text is not a plain positive user id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a user id: '{0}'")]
pub struct InvalidUserId(pub String);

impl FromStr for UserId {
    type Err = InvalidUserId;

    /// Parses a start parameter; only plain decimal digits are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidUserId(s.to_owned()));
        }
        trimmed
            .parse()
            .map(Self)
            .map_err(|_| InvalidUserId(s.to_owned()))
    }
}

/// Referral and subscription state for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,

    /// Telegram username at registration time.
    #[serde(default)]
    pub username: Option<String>,

    /// Number of referred users who completed the channel check.
    #[serde(default)]
    pub invited_count: u32,

    /// Whether the user has verified membership in all required channels.
    #[serde(default)]
    pub channels_followed: bool,

    /// User whose referral link brought this user in. Never changes once set.
    #[serde(default)]
    pub referrer_id: Option<UserId>,

    pub registered_at: DateTime<Utc>,

    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Creates a fresh, unverified record with zero counters.
    #[must_use]
    pub fn new(user_id: UserId, username: Option<String>, referrer_id: Option<UserId>) -> Self {
        Self {
            user_id,
            username,
            invited_count: 0,
            channels_followed: false,
            referrer_id,
            registered_at: Utc::now(),
            verified_at: None,
        }
    }

    /// Returns how many more verified referrals are needed to reach `threshold`.
    #[must_use]
    pub const fn remaining(&self, threshold: u32) -> u32 {
        threshold.saturating_sub(self.invited_count)
    }

    /// Checks whether the referral count has reached `threshold`.
    #[must_use]
    pub const fn has_reached(&self, threshold: u32) -> bool {
        self.invited_count >= threshold
    }
}
