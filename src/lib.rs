//! Referral Gate Bot Library
//!
//! A Telegram bot that hands out a private channel link to users who
//! bring in enough verified referrals.
//!
//! This crate provides the core functionality for:
//! - Loading and validating the referral configuration
//! - Persisting user records and referral counts
//! - Checking channel membership through the Bot API
//! - Turning button presses and commands into bot replies

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod presenter;
pub mod referral;
pub mod registry;
pub mod telegram;
