//! In-memory platform used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{Keyboard, MembershipStatus, Platform, PlatformError, PlatformErrorKind};
use crate::config::Channel;
use crate::registry::UserId;

/// Everything the bot sent, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Sent {
        chat: UserId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edited {
        chat: UserId,
        message_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Answered(String),
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    statuses: Mutex<HashMap<(String, i64), Result<MembershipStatus, PlatformError>>>,
    outbound: Mutex<Vec<Outbound>>,
    send_error: Mutex<Option<PlatformErrorKind>>,
    edit_error: Mutex<Option<PlatformErrorKind>>,
    answer_error: Mutex<Option<PlatformErrorKind>>,
    lookups: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, channel: &str, user: i64, status: MembershipStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert((Channel::new(channel).as_str().to_owned(), user), Ok(status));
    }

    /// Makes `user` a member of every listed channel.
    pub fn join_all(&self, channels: &[&str], user: i64) {
        for channel in channels {
            self.set_status(channel, user, MembershipStatus::Member);
        }
    }

    pub fn fail_lookup(&self, channel: &str, user: i64, kind: PlatformErrorKind) {
        self.statuses.lock().unwrap().insert(
            (Channel::new(channel).as_str().to_owned(), user),
            Err(PlatformError::new(kind, "scripted failure")),
        );
    }

    pub fn fail_sends(&self, kind: Option<PlatformErrorKind>) {
        *self.send_error.lock().unwrap() = kind;
    }

    pub fn fail_edits(&self, kind: Option<PlatformErrorKind>) {
        *self.edit_error.lock().unwrap() = kind;
    }

    pub fn fail_answers(&self, kind: Option<PlatformErrorKind>) {
        *self.answer_error.lock().unwrap() = kind;
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().unwrap().clone()
    }

    /// Texts of new messages sent to `user`.
    pub fn sent_to(&self, user: i64) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Sent { chat, text, .. } if chat == UserId(user) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn scripted(slot: &Mutex<Option<PlatformErrorKind>>) -> Result<(), PlatformError> {
        match *slot.lock().unwrap() {
            Some(kind) => Err(PlatformError::new(kind, "scripted failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn membership_status(
        &self,
        channel: &Channel,
        user_id: UserId,
    ) -> Result<MembershipStatus, PlatformError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(&(channel.as_str().to_owned(), user_id.0))
            .cloned()
            .unwrap_or(Ok(MembershipStatus::Left))
    }

    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        Self::scripted(&self.send_error)?;
        self.outbound.lock().unwrap().push(Outbound::Sent {
            chat,
            text: text.to_owned(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        chat: UserId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        Self::scripted(&self.edit_error)?;
        self.outbound.lock().unwrap().push(Outbound::Edited {
            chat,
            message_id,
            text: text.to_owned(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str) -> Result<(), PlatformError> {
        Self::scripted(&self.answer_error)?;
        self.outbound
            .lock()
            .unwrap()
            .push(Outbound::Answered(query_id.to_owned()));
        Ok(())
    }
}
