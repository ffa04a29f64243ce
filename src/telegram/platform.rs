//! Platform abstraction consumed by the referral engine and event handler.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::Keyboard;
use super::types::Update;
use crate::config::Channel;
use crate::registry::UserId;

/// A user's relationship to a chat as reported by Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MembershipStatus {
    /// Only owners, administrators and plain members count as following.
    #[must_use]
    pub const fn is_member(self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }
}

/// What went wrong talking to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// An edit produced the text and markup the message already has.
    MessageNotModified,
    /// A callback query can no longer be answered.
    QueryExpired,
    /// The user blocked the bot or the bot lacks access.
    Blocked,
    /// The chat or user does not exist.
    NotFound,
    /// Telegram asked us to wait this many seconds.
    FloodWait(u32),
    /// The request never got an answer.
    Network,
    /// The answer could not be understood.
    InvalidResponse,
    /// Any other Bot API error, by error code.
    Api(i32),
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageNotModified => f.write_str("message not modified"),
            Self::QueryExpired => f.write_str("callback query expired"),
            Self::Blocked => f.write_str("forbidden"),
            Self::NotFound => f.write_str("not found"),
            Self::FloodWait(secs) => write!(f, "flood wait {secs}s"),
            Self::Network => f.write_str("network error"),
            Self::InvalidResponse => f.write_str("invalid response"),
            Self::Api(code) => write!(f, "api error {code}"),
        }
    }
}

/// Error returned by [`Platform`] calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
}

impl PlatformError {
    #[must_use]
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies a failed Bot API answer.
    ///
    /// `retry_after` and the error code are used first; the description is
    /// only consulted for the two cases Telegram reports as plain 400s.
    #[must_use]
    pub fn from_api(error_code: Option<i32>, description: &str, retry_after: Option<u32>) -> Self {
        let lower = description.to_lowercase();
        let kind = if let Some(secs) = retry_after {
            PlatformErrorKind::FloodWait(secs)
        } else if lower.contains("message is not modified") {
            PlatformErrorKind::MessageNotModified
        } else if lower.contains("query is too old") || lower.contains("query id is invalid") {
            PlatformErrorKind::QueryExpired
        } else {
            match error_code {
                Some(403) => PlatformErrorKind::Blocked,
                Some(429) => PlatformErrorKind::FloodWait(1),
                Some(400) if lower.contains("not found") => PlatformErrorKind::NotFound,
                Some(code) => PlatformErrorKind::Api(code),
                None => PlatformErrorKind::InvalidResponse,
            }
        };
        Self::new(kind, description)
    }
}

/// Outbound and lookup operations the bot needs from the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Returns the membership status of `user_id` in `channel`.
    async fn membership_status(
        &self,
        channel: &Channel,
        user_id: UserId,
    ) -> Result<MembershipStatus, PlatformError>;

    /// Sends a new message to a user's private chat.
    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError>;

    /// Replaces the text and keyboard of an existing message.
    async fn edit_message(
        &self,
        chat: UserId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError>;

    /// Acknowledges a callback query so the client stops its spinner.
    async fn answer_callback(&self, query_id: &str) -> Result<(), PlatformError>;
}

/// Source of inbound updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Returns updates with `update_id >= offset`, waiting up to `timeout` for new ones.
    ///
    /// Asking for `offset` confirms every earlier update.
    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, PlatformError>;
}
