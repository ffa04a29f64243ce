//! Telegram platform module.
//!
//! Defines the [`Platform`] seam the referral logic talks through and a
//! Bot API implementation of it, including keyboards and rate limiting.

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod keyboard;
mod platform;
mod rate_limiter;
pub mod types;

pub use client::BotApiClient;
pub use keyboard::{Button, ButtonAction, Keyboard};
pub use platform::{MembershipStatus, Platform, PlatformError, PlatformErrorKind, UpdateSource};
pub use rate_limiter::RateLimiter;
