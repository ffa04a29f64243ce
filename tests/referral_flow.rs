//! End-to-end referral scenarios driven through the public engine API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use referral_gate_bot::config::{Channel, ReferralConfig};
use referral_gate_bot::referral::{InviteStatus, ReferralEngine, VerificationOutcome};
use referral_gate_bot::registry::{UserId, UserRegistry};
use referral_gate_bot::telegram::{Keyboard, MembershipStatus, Platform, PlatformError};

const CHANNELS: [&str; 2] = ["@english_avenue", "@ielts_bus"];
const UNLOCK_LINK: &str = "https://t.me/+private_hash";

/// Membership is granted per (channel, user); every sent text is recorded.
#[derive(Default)]
struct RecordingPlatform {
    members: Mutex<HashSet<(String, i64)>>,
    sent: Mutex<Vec<(UserId, String)>>,
}

impl RecordingPlatform {
    fn join(&self, channel: &str, user: i64) {
        self.members
            .lock()
            .unwrap()
            .insert((Channel::new(channel).as_str().to_owned(), user));
    }

    fn join_all(&self, user: i64) {
        for channel in CHANNELS {
            self.join(channel, user);
        }
    }

    fn sent_to(&self, user: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == UserId(user))
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn membership_status(
        &self,
        channel: &Channel,
        user_id: UserId,
    ) -> Result<MembershipStatus, PlatformError> {
        let joined = self
            .members
            .lock()
            .unwrap()
            .contains(&(channel.as_str().to_owned(), user_id.0));
        Ok(if joined {
            MembershipStatus::Member
        } else {
            MembershipStatus::Left
        })
    }

    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((chat, text.to_owned()));
        Ok(())
    }

    async fn edit_message(
        &self,
        chat: UserId,
        _message_id: i64,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((chat, text.to_owned()));
        Ok(())
    }

    async fn answer_callback(&self, _query_id: &str) -> Result<(), PlatformError> {
        Ok(())
    }
}

fn config() -> ReferralConfig {
    ReferralConfig {
        required_channels: CHANNELS.iter().map(|c| Channel::new(c)).collect(),
        required_invites: 5,
        unlock_channel_link: UNLOCK_LINK.to_owned(),
        bot_entrypoint: Some("https://t.me/referral_test_bot".to_owned()),
    }
}

fn engine_over(registry: Arc<UserRegistry>, platform: &Arc<RecordingPlatform>) -> ReferralEngine {
    ReferralEngine::new(config(), registry, Arc::clone(platform) as Arc<dyn Platform>).unwrap()
}

async fn verify(engine: &ReferralEngine, platform: &RecordingPlatform, user: i64, referrer: Option<i64>) {
    let param = referrer.map(|r| r.to_string());
    engine.start(UserId(user), None, param.as_deref()).await.unwrap();
    platform.join_all(user);
    let outcome = engine.check_subscription(UserId(user)).await.unwrap();
    assert!(matches!(outcome, VerificationOutcome::Verified { .. }), "{outcome:?}");
}

#[tokio::test]
async fn test_five_referrals_unlock_the_channel_once() {
    let platform = Arc::new(RecordingPlatform::default());
    let engine = engine_over(Arc::new(UserRegistry::in_memory()), &platform);

    verify(&engine, &platform, 1, None).await;
    assert_eq!(
        engine.referral_link(UserId(1)).await.unwrap().as_deref(),
        Some("https://t.me/referral_test_bot?start=1")
    );

    for friend in 10..15 {
        verify(&engine, &platform, friend, Some(1)).await;
    }

    let notifications = platform.sent_to(1);
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].contains(UNLOCK_LINK));

    let profile = engine.profile(UserId(1)).await.unwrap();
    assert_eq!(profile.invited_count, 5);
    assert_eq!(profile.remaining, 0);
    assert_eq!(profile.unlock_link.as_deref(), Some(UNLOCK_LINK));
    assert_eq!(
        engine.invite_status(UserId(1)).await.unwrap(),
        InviteStatus::Unlocked {
            link: UNLOCK_LINK.to_owned()
        }
    );

    // A sixth referral counts but does not notify again.
    verify(&engine, &platform, 15, Some(1)).await;
    assert_eq!(engine.profile(UserId(1)).await.unwrap().invited_count, 6);
    assert_eq!(platform.sent_to(1).len(), 1);
}

#[tokio::test]
async fn test_rechecking_a_verified_user_changes_nothing() {
    let platform = Arc::new(RecordingPlatform::default());
    let engine = engine_over(Arc::new(UserRegistry::in_memory()), &platform);

    verify(&engine, &platform, 1, None).await;
    verify(&engine, &platform, 2, Some(1)).await;

    for _ in 0..3 {
        assert_eq!(
            engine.check_subscription(UserId(2)).await.unwrap(),
            VerificationOutcome::AlreadyVerified
        );
    }
    assert_eq!(engine.profile(UserId(1)).await.unwrap().invited_count, 1);
}

#[tokio::test]
async fn test_verification_without_referrer_credits_nobody() {
    let platform = Arc::new(RecordingPlatform::default());
    let registry = Arc::new(UserRegistry::in_memory());
    let engine = engine_over(Arc::clone(&registry), &platform);

    verify(&engine, &platform, 1, None).await;
    verify(&engine, &platform, 2, None).await;

    let stats = registry.stats(engine.threshold()).await;
    assert_eq!(stats.users, 2);
    assert_eq!(stats.verified, 2);
    assert_eq!(engine.profile(UserId(1)).await.unwrap().invited_count, 0);
}

#[tokio::test]
async fn test_missing_one_channel_keeps_user_pending() {
    let platform = Arc::new(RecordingPlatform::default());
    let engine = engine_over(Arc::new(UserRegistry::in_memory()), &platform);

    verify(&engine, &platform, 1, None).await;
    engine.start(UserId(2), None, Some("1")).await.unwrap();
    platform.join("@english_avenue", 2);

    match engine.check_subscription(UserId(2)).await.unwrap() {
        VerificationOutcome::Pending { missing } => {
            assert_eq!(missing, vec![Channel::new("@ielts_bus")]);
        }
        other => panic!("expected pending, got {other:?}"),
    }
    assert_eq!(engine.referral_link(UserId(2)).await.unwrap(), None);
    assert_eq!(engine.profile(UserId(1)).await.unwrap().invited_count, 0);

    platform.join("@ielts_bus", 2);
    assert!(matches!(
        engine.check_subscription(UserId(2)).await.unwrap(),
        VerificationOutcome::Verified { credit: Some(_) }
    ));
    assert_eq!(engine.profile(UserId(1)).await.unwrap().invited_count, 1);
}

#[tokio::test]
async fn test_progress_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let platform = Arc::new(RecordingPlatform::default());

    {
        let registry = Arc::new(UserRegistry::open(&path).await.unwrap());
        let engine = engine_over(Arc::clone(&registry), &platform);
        verify(&engine, &platform, 1, None).await;
        for friend in 10..15 {
            verify(&engine, &platform, friend, Some(1)).await;
        }
        registry.close().await.unwrap();
    }

    let registry = Arc::new(UserRegistry::open(&path).await.unwrap());
    let engine = engine_over(registry, &platform);

    let profile = engine.profile(UserId(1)).await.unwrap();
    assert_eq!(profile.invited_count, 5);
    assert_eq!(profile.unlock_link.as_deref(), Some(UNLOCK_LINK));
    assert_eq!(
        engine.check_subscription(UserId(12)).await.unwrap(),
        VerificationOutcome::AlreadyVerified
    );
    assert_eq!(platform.sent_to(1).len(), 1);
}
