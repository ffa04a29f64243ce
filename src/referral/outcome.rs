//! Plain data returned by the referral engine.

use crate::config::Channel;
use crate::registry::UserId;

/// Result of a start event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// Whether this start created the user's record.
    pub created: bool,

    /// Referrer stored on the record (from this or an earlier start).
    pub referrer_id: Option<UserId>,

    /// Whether the user already passed the channel check.
    pub verified: bool,
}

/// Result of a subscription check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// This call moved the user to verified.
    Verified { credit: Option<ReferralCredit> },

    /// The user was verified before; nothing changed.
    AlreadyVerified,

    /// Some channels are still not joined, in configured order.
    Pending { missing: Vec<Channel> },
}

/// Credit applied to a referrer when their referred user verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralCredit {
    pub referrer_id: UserId,

    /// Referrer's count after the increment.
    pub invited_count: u32,

    /// This credit crossed the threshold.
    pub unlocked: bool,

    /// The unlock notification was delivered.
    pub notified: bool,
}

/// Profile data for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub invited_count: u32,

    /// Verified referrals still needed, never negative.
    pub remaining: u32,

    /// Referral link and unlock features are only offered to verified users.
    pub features_available: bool,

    /// Present when the features are available and the threshold is reached.
    pub unlock_link: Option<String>,
}

/// Answer to the invite threshold check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteStatus {
    /// The user has not verified their channel subscriptions.
    Locked,

    /// Threshold reached.
    Unlocked { link: String },

    /// Verified referrals still needed.
    Remaining(u32),
}
