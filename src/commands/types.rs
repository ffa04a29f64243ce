//! Event types and parsing.

use std::fmt;

use crate::registry::UserId;
use crate::telegram::types::{CallbackQuery, Message, Update};

/// Callback data carried by inline buttons.
pub mod callback {
    pub const CHECK_SUBSCRIPTION: &str = "check_subscription";
    pub const PROFILE: &str = "profile";
    pub const REFERRAL_LINK: &str = "referral_link";
    pub const BACK: &str = "back_to_main";
}

/// Everything a user can ask the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// `/start`, optionally with a referral parameter.
    Start { start_param: Option<String> },

    /// "I've followed all channels" button.
    CheckSubscription,

    /// Profile button.
    ShowProfile,

    /// Referral link button.
    ShowReferralLink,

    /// `/check` command.
    CheckInvites,

    /// Back button.
    Back,
}

impl BotEvent {
    /// Parses a command from a message text.
    ///
    /// `/cmd@name` is only accepted when `name` matches `bot_username`.
    /// Returns `None` if the message is not a known command.
    #[must_use]
    pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let (command, args) = match rest.split_once(char::is_whitespace) {
            Some((command, args)) => (command, Some(args.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        let command = match command.split_once('@') {
            Some((command, target)) => {
                let addressed_to_us =
                    bot_username.is_some_and(|name| name.eq_ignore_ascii_case(target));
                if !addressed_to_us {
                    return None;
                }
                command
            }
            None => command,
        };

        match command.to_lowercase().as_str() {
            "start" => Some(Self::Start {
                start_param: args.map(str::to_owned),
            }),
            "check" => Some(Self::CheckInvites),
            _ => None,
        }
    }

    /// Parses callback data from an inline button.
    #[must_use]
    pub fn parse_callback(data: &str) -> Option<Self> {
        match data {
            callback::CHECK_SUBSCRIPTION => Some(Self::CheckSubscription),
            callback::PROFILE => Some(Self::ShowProfile),
            callback::REFERRAL_LINK => Some(Self::ShowReferralLink),
            callback::BACK => Some(Self::Back),
            _ => None,
        }
    }

    /// Returns the event name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::CheckSubscription => "check_subscription",
            Self::ShowProfile => "profile",
            Self::ShowReferralLink => "referral_link",
            Self::CheckInvites => "check",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for BotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start {
                start_param: Some(param),
            } => write!(f, "start {param}"),
            _ => f.write_str(self.name()),
        }
    }
}

/// The user behind an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub first_name: String,
    pub username: Option<String>,
}

/// Where an event came from, which decides how to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A message in the user's private chat; answered with a new message.
    Message { chat: UserId },

    /// A button press; answered by editing the message, when it is still known.
    Callback {
        query_id: String,
        chat: UserId,
        message_id: Option<i64>,
    },
}

impl Origin {
    /// Chat the answer goes to.
    #[must_use]
    pub const fn chat(&self) -> UserId {
        match self {
            Self::Message { chat } | Self::Callback { chat, .. } => *chat,
        }
    }
}

/// A parsed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub event: BotEvent,
    pub sender: Sender,
    pub origin: Origin,
}

impl Incoming {
    /// Converts a raw update into an event.
    ///
    /// Returns `None` for anything the bot does not react to: non-private
    /// chats, messages from bots, unknown commands and callback data.
    #[must_use]
    pub fn from_update(update: &Update, bot_username: Option<&str>) -> Option<Self> {
        if let Some(message) = &update.message {
            return Self::from_message(message, bot_username);
        }
        update.callback_query.as_ref().and_then(Self::from_callback)
    }

    fn from_message(message: &Message, bot_username: Option<&str>) -> Option<Self> {
        if !message.chat.is_private() {
            return None;
        }
        let from = message.from.as_ref().filter(|u| !u.is_bot)?;
        let event = BotEvent::parse_command(message.text.as_deref()?, bot_username)?;

        Some(Self {
            event,
            sender: Sender {
                user_id: UserId(from.id),
                first_name: from.first_name.clone(),
                username: from.username.clone(),
            },
            origin: Origin::Message {
                chat: UserId(message.chat.id),
            },
        })
    }

    fn from_callback(query: &CallbackQuery) -> Option<Self> {
        let event = BotEvent::parse_callback(query.data.as_deref()?)?;

        // Buttons only live in the private chat, so the chat is the sender.
        let chat = query
            .message
            .as_ref()
            .map_or(UserId(query.from.id), |m| UserId(m.chat.id));

        Some(Self {
            event,
            sender: Sender {
                user_id: UserId(query.from.id),
                first_name: query.from.first_name.clone(),
                username: query.from.username.clone(),
            },
            origin: Origin::Callback {
                query_id: query.id.clone(),
                chat,
                message_id: query.message.as_ref().map(|m| m.message_id),
            },
        })
    }
}
