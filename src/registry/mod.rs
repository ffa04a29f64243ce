//! User registry module.
//!
//! Persists per-user referral and subscription state keyed by Telegram user id.

mod record;
mod store;

pub use record::{InvalidUserId, UserId, UserRecord};
pub use store::{RegistryError, RegistryStats, UserRegistry, Verification};
