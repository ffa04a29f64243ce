//! Referral engine module.
//!
//! Verifies channel subscriptions, credits referrers exactly once per
//! referred user and grants the private channel link at the threshold.

mod engine;
mod outcome;

pub use engine::{EngineError, ReferralEngine};
pub use outcome::{InviteStatus, ProfileView, ReferralCredit, StartOutcome, VerificationOutcome};
