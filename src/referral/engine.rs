//! Referral engine implementation.
//!
//! A user moves from unverified to verified exactly once:
//! 1. Every required channel is checked (lookup errors count as not joined)
//! 2. Under the transition lock the user is marked verified and, if they
//!    have a referrer, the referrer's count is incremented in the same write
//! 3. If that increment crossed the threshold, the referrer gets the unlock
//!    link (outside the lock, best effort)

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{InviteStatus, ProfileView, ReferralCredit, StartOutcome, VerificationOutcome};
use crate::config::{Channel, ReferralConfig, ValidationError};
use crate::presenter;
use crate::registry::{RegistryError, UserId, UserRecord, UserRegistry};
use crate::telegram::Platform;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("User {0} is not registered")]
    NotFound(UserId),

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(user_id) => Self::NotFound(user_id),
            other => Self::Registry(other),
        }
    }
}

/// Decides verification, credit and unlock transitions.
pub struct ReferralEngine {
    config: ReferralConfig,

    /// Base of every referral link, e.g. `https://t.me/some_bot`.
    bot_entrypoint: String,

    registry: Arc<UserRegistry>,

    platform: Arc<dyn Platform>,

    /// Serializes the verify-and-credit write and threshold evaluation.
    transition: Mutex<()>,
}

impl ReferralEngine {
    /// Creates an engine over a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or has no bot entrypoint.
    pub fn new(
        config: ReferralConfig,
        registry: Arc<UserRegistry>,
        platform: Arc<dyn Platform>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let bot_entrypoint = config
            .bot_entrypoint
            .clone()
            .ok_or(ValidationError::MissingEntrypoint)?;

        Ok(Self {
            config,
            bot_entrypoint,
            registry,
            platform,
            transition: Mutex::new(()),
        })
    }

    /// Number of verified referrals needed to unlock.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.config.required_invites
    }

    /// Channels every user must follow.
    #[must_use]
    pub fn required_channels(&self) -> &[Channel] {
        &self.config.required_channels
    }

    /// Returns the shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<UserRegistry> {
        &self.registry
    }

    /// Registers a user on their first start event.
    ///
    /// `start_param` is taken as the referrer only if it is another,
    /// already registered user's id; it is ignored for existing users.
    pub async fn start(
        &self,
        user_id: UserId,
        username: Option<String>,
        start_param: Option<&str>,
    ) -> Result<StartOutcome, EngineError> {
        let referrer_id = match start_param {
            Some(param) => self.accept_referrer(user_id, param).await,
            None => None,
        };

        let created = self.registry.register(user_id, username, referrer_id).await?;
        let record = self.record(user_id).await?;

        Ok(StartOutcome {
            created,
            referrer_id: record.referrer_id,
            verified: record.channels_followed,
        })
    }

    async fn accept_referrer(&self, user_id: UserId, param: &str) -> Option<UserId> {
        let referrer_id = match param.parse::<UserId>() {
            Ok(id) => id,
            Err(e) => {
                debug!("Ignoring start parameter from user {}: {}", user_id, e);
                return None;
            }
        };

        if referrer_id == user_id {
            debug!("Ignoring self-referral from user {}", user_id);
            return None;
        }

        if self.registry.get(referrer_id).await.is_none() {
            debug!(
                "Ignoring unknown referrer {} for user {}",
                referrer_id, user_id
            );
            return None;
        }

        Some(referrer_id)
    }

    /// Checks the user's subscriptions and applies the verification transition.
    pub async fn check_subscription(
        &self,
        user_id: UserId,
    ) -> Result<VerificationOutcome, EngineError> {
        let record = self.record(user_id).await?;
        if record.channels_followed {
            debug!("User {} is already verified", user_id);
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        let missing = self.unmet_channels(user_id).await;
        if !missing.is_empty() {
            debug!("User {} still misses {} channel(s)", user_id, missing.len());
            return Ok(VerificationOutcome::Pending { missing });
        }

        let credit = {
            let _guard = self.transition.lock().await;

            let verification = self.registry.verify_and_credit(user_id).await?;
            if !verification.newly_verified {
                return Ok(VerificationOutcome::AlreadyVerified);
            }
            info!("User {} verified all required channels", user_id);

            record
                .referrer_id
                .and_then(|referrer_id| self.credit(referrer_id, user_id, verification.referrer_count))
        };

        let credit = match credit {
            Some(mut credit) if credit.unlocked => {
                credit.notified = self.notify_unlock(credit.referrer_id).await;
                Some(credit)
            }
            other => other,
        };

        Ok(VerificationOutcome::Verified { credit })
    }

    /// Returns the required channels the user has not joined, in configured order.
    ///
    /// Lookups run one channel at a time; a failed lookup counts as not joined.
    pub async fn unmet_channels(&self, user_id: UserId) -> Vec<Channel> {
        let mut missing = Vec::new();

        for channel in &self.config.required_channels {
            match self.platform.membership_status(channel, user_id).await {
                Ok(status) if status.is_member() => {}
                Ok(status) => {
                    debug!("User {} is {:?} in {}", user_id, status, channel);
                    missing.push(channel.clone());
                }
                Err(e) => {
                    warn!(
                        "Error checking membership of user {} in {}: {}",
                        user_id, channel, e
                    );
                    missing.push(channel.clone());
                }
            }
        }

        missing
    }

    /// Describes the credit applied to `referrer_id`, if it was registered.
    fn credit(
        &self,
        referrer_id: UserId,
        referred_id: UserId,
        invited_count: Option<u32>,
    ) -> Option<ReferralCredit> {
        let Some(invited_count) = invited_count else {
            warn!(
                "Referrer {} of user {} is not registered, skipping credit",
                referrer_id, referred_id
            );
            return None;
        };

        let threshold = self.threshold();
        info!(
            "Credited referrer {} for user {} ({}/{})",
            referrer_id, referred_id, invited_count, threshold
        );

        Some(ReferralCredit {
            referrer_id,
            invited_count,
            unlocked: invited_count == threshold,
            notified: false,
        })
    }

    /// Sends the unlock link; returns whether it was delivered.
    async fn notify_unlock(&self, referrer_id: UserId) -> bool {
        let text = presenter::unlock_notification(self.threshold(), &self.config.unlock_channel_link);

        match self.platform.send_message(referrer_id, &text, None).await {
            Ok(()) => {
                info!("Sent unlock link to user {}", referrer_id);
                true
            }
            Err(e) => {
                warn!("Failed to send channel link to user {}: {}", referrer_id, e);
                false
            }
        }
    }

    /// Returns the user's referral progress.
    pub async fn profile(&self, user_id: UserId) -> Result<ProfileView, EngineError> {
        let record = self.record(user_id).await?;
        let threshold = self.threshold();

        let unlock_link = (record.channels_followed && record.has_reached(threshold))
            .then(|| self.config.unlock_channel_link.clone());

        Ok(ProfileView {
            invited_count: record.invited_count,
            remaining: record.remaining(threshold),
            features_available: record.channels_followed,
            unlock_link,
        })
    }

    /// Answers whether the user has unlocked the private channel.
    pub async fn invite_status(&self, user_id: UserId) -> Result<InviteStatus, EngineError> {
        let record = self.record(user_id).await?;
        let threshold = self.threshold();

        Ok(if !record.channels_followed {
            InviteStatus::Locked
        } else if record.has_reached(threshold) {
            InviteStatus::Unlocked {
                link: self.config.unlock_channel_link.clone(),
            }
        } else {
            InviteStatus::Remaining(record.remaining(threshold))
        })
    }

    /// Returns the user's referral link once they are verified.
    pub async fn referral_link(&self, user_id: UserId) -> Result<Option<String>, EngineError> {
        let record = self.record(user_id).await?;
        Ok(record
            .channels_followed
            .then(|| self.link_for(user_id)))
    }

    fn link_for(&self, user_id: UserId) -> String {
        format!("{}?start={}", self.bot_entrypoint, user_id)
    }

    async fn record(&self, user_id: UserId) -> Result<UserRecord, EngineError> {
        self.registry
            .get(user_id)
            .await
            .ok_or(EngineError::NotFound(user_id))
    }
}

impl std::fmt::Debug for ReferralEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferralEngine")
            .field("required_channels", &self.config.required_channels)
            .field("required_invites", &self.config.required_invites)
            .field("bot_entrypoint", &self.bot_entrypoint)
            .finish_non_exhaustive()
    }
}
