//! Configuration module for the referral bot.
//!
//! Handles loading and validation of the referral settings file
//! and the runtime settings taken from the environment.

mod referral;
mod settings;

pub use referral::{Channel, ReferralConfig, ValidationError};
pub use settings::{BotSettings, ConfigError};

/// Number of verified referrals required when the config does not say otherwise.
pub const DEFAULT_REQUIRED_INVITES: u32 = 5;

/// Base URL for public Telegram links.
pub const TELEGRAM_LINK_BASE: &str = "https://t.me";
