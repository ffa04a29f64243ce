//! Event handler implementation.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::types::{BotEvent, Incoming, Origin, Sender};
use crate::presenter::{self, Reply};
use crate::referral::{EngineError, ReferralEngine, VerificationOutcome};
use crate::telegram::{Platform, PlatformErrorKind};

/// Drives the referral engine for inbound events and delivers the replies.
pub struct EventHandler {
    engine: Arc<ReferralEngine>,

    platform: Arc<dyn Platform>,
}

impl EventHandler {
    /// Creates a new event handler.
    #[must_use]
    pub fn new(engine: Arc<ReferralEngine>, platform: Arc<dyn Platform>) -> Self {
        Self { engine, platform }
    }

    /// Handles one event end to end. Never fails; problems are logged.
    pub async fn handle(&self, incoming: Incoming) {
        if let Origin::Callback { query_id, .. } = &incoming.origin {
            self.acknowledge(query_id).await;
        }

        debug!(
            "Handling {} from user {}",
            incoming.event, incoming.sender.user_id
        );

        let reply = match self.execute(&incoming.event, &incoming.sender).await {
            Ok(reply) => reply,
            Err(EngineError::NotFound(user_id)) => {
                info!("User {} sent {} before /start", user_id, incoming.event);
                presenter::user_not_found()
            }
            Err(e) => {
                error!(
                    "Failed to handle {} for user {}: {}",
                    incoming.event, incoming.sender.user_id, e
                );
                presenter::temporary_failure()
            }
        };

        self.deliver(&incoming.origin, &reply).await;
    }

    /// Runs the engine operation behind an event and renders its result.
    async fn execute(&self, event: &BotEvent, sender: &Sender) -> Result<Reply, EngineError> {
        let user_id = sender.user_id;

        match event {
            BotEvent::Start { start_param } => {
                let outcome = self
                    .engine
                    .start(user_id, sender.username.clone(), start_param.as_deref())
                    .await?;
                if outcome.verified {
                    self.main_menu(sender).await
                } else {
                    Ok(presenter::channel_prompt(self.engine.required_channels()))
                }
            }
            BotEvent::CheckSubscription => match self.engine.check_subscription(user_id).await? {
                VerificationOutcome::Pending { missing } => Ok(presenter::missing_channels(&missing)),
                VerificationOutcome::Verified { .. } | VerificationOutcome::AlreadyVerified => {
                    self.main_menu(sender).await
                }
            },
            BotEvent::ShowProfile => {
                let view = self.engine.profile(user_id).await?;
                Ok(presenter::profile(&sender.first_name, &view))
            }
            BotEvent::ShowReferralLink => {
                let link = self.engine.referral_link(user_id).await?;
                Ok(presenter::referral_link(link.as_deref()))
            }
            BotEvent::CheckInvites => {
                let status = self.engine.invite_status(user_id).await?;
                Ok(presenter::invite_status(&status, self.engine.threshold()))
            }
            BotEvent::Back => self.main_menu(sender).await,
        }
    }

    /// Main menu for verified users; unverified users get the channel prompt.
    async fn main_menu(&self, sender: &Sender) -> Result<Reply, EngineError> {
        Ok(match self.engine.referral_link(sender.user_id).await? {
            Some(link) => presenter::main_menu(&sender.first_name, &link),
            None => presenter::channel_prompt(self.engine.required_channels()),
        })
    }

    async fn acknowledge(&self, query_id: &str) {
        match self.platform.answer_callback(query_id).await {
            Ok(()) => {}
            Err(e) if e.kind == PlatformErrorKind::QueryExpired => {
                warn!("Received an expired callback query. Proceeding without answering.");
            }
            Err(e) => warn!("Failed to answer callback query {}: {}", query_id, e),
        }
    }

    /// Edits the originating message for button presses, sends a new one otherwise.
    ///
    /// A button whose message can no longer be edited gets a fresh message.
    async fn deliver(&self, origin: &Origin, reply: &Reply) {
        let chat = origin.chat();
        let keyboard = reply.keyboard.as_ref();

        let result = match origin {
            Origin::Callback {
                message_id: Some(message_id),
                ..
            } => match self
                .platform
                .edit_message(chat, *message_id, &reply.text, keyboard)
                .await
            {
                Err(e)
                    if !matches!(
                        e.kind,
                        PlatformErrorKind::MessageNotModified | PlatformErrorKind::Blocked
                    ) =>
                {
                    debug!(
                        "Cannot edit message {} for user {} ({}), sending a new one",
                        message_id, chat, e
                    );
                    self.platform.send_message(chat, &reply.text, keyboard).await
                }
                other => other,
            },
            _ => self.platform.send_message(chat, &reply.text, keyboard).await,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.kind == PlatformErrorKind::MessageNotModified => {
                debug!("Message for user {} already up to date", chat);
            }
            Err(e) => warn!("Failed to deliver reply to user {}: {}", chat, e),
        }
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
