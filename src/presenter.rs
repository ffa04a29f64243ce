//! Message texts and keyboards.
//!
//! Everything here is a pure function of the data it is given.

use crate::commands::callback;
use crate::config::Channel;
use crate::referral::{InviteStatus, ProfileView};
use crate::telegram::{Button, Keyboard};

const CHECK_BUTTON: &str = "✅ I've followed all channels";
const BACK_BUTTON: &str = "Back";
const INVITE_BUTTON: &str = "✉️ Invite Friends";
const CONFETTI: &str = "🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉";
const INVITE_PITCH: &str = "Congratulations on your first step towards a bright future!\n\
     Now, invite your friends to get your link to our private channel where we have lessons together.";

/// A rendered message: text plus optional inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// First prompt: every required channel plus the re-check button.
#[must_use]
pub fn channel_prompt(channels: &[Channel]) -> Reply {
    channel_list("🔔 Welcome! Please join these channels to continue:", channels)
}

/// Prompt after a failed check, listing only the channels still missing.
#[must_use]
pub fn missing_channels(missing: &[Channel]) -> Reply {
    channel_list(
        "❌ You haven't joined all the required channels yet. \
         Please join the remaining channels and try again:",
        missing,
    )
}

fn channel_list(header: &str, channels: &[Channel]) -> Reply {
    let mut text = header.to_owned();
    let mut keyboard = Keyboard::new();

    for channel in channels {
        match channel.join_url() {
            Some(url) => keyboard = keyboard.button(Button::url(format!("Join {channel}"), url)),
            // Private channels have no public link; name them in the text instead.
            None => {
                text.push_str("\n• ");
                text.push_str(channel.as_str());
            }
        }
    }

    Reply::with_keyboard(
        text,
        keyboard.button(Button::callback(CHECK_BUTTON, callback::CHECK_SUBSCRIPTION)),
    )
}

/// Main menu shown to verified users.
#[must_use]
pub fn main_menu(first_name: &str, referral_link: &str) -> Reply {
    let text = format!(
        "Hello {first_name}! Congratulations on your first step towards a bright future!🥳\n\n\
         Now, invite your friends to get your link to our private channel where we have lessons together.👨🏻‍💻👩‍💻\n\n\
         Your referral link 🔗: {referral_link}"
    );

    let keyboard = Keyboard::new()
        .row([
            Button::callback("👤 Profile", callback::PROFILE),
            Button::callback("🔗 Referral Link", callback::REFERRAL_LINK),
        ])
        .button(Button::switch_inline(INVITE_BUTTON, invite_share_text(referral_link)));

    Reply::with_keyboard(text, keyboard)
}

/// Profile screen.
#[must_use]
pub fn profile(first_name: &str, view: &ProfileView) -> Reply {
    let text = if view.features_available {
        let mut text = format!(
            "Name: {first_name}\nInvited friends: {}\n",
            view.invited_count
        );
        match &view.unlock_link {
            Some(link) => text.push_str(&format!(
                "\n🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉🎉\n\
                 Congratulations! You can join the channel via this link:\n{link}"
            )),
            None => text.push_str(&format!(
                "\n⌛️⏳Friends to invite for channel access: {}",
                view.remaining
            )),
        }
        text
    } else {
        "❌Please follow the required channels first.".to_owned()
    };

    Reply::with_keyboard(text, back_keyboard())
}

/// Referral link screen; `None` when the user has not verified yet.
#[must_use]
pub fn referral_link(link: Option<&str>) -> Reply {
    match link {
        Some(link) => {
            let text = format!("Your referral link 🔗: \n{CONFETTI}\n{INVITE_PITCH}\n{link}");
            let keyboard = Keyboard::new()
                .button(Button::switch_inline(INVITE_BUTTON, invite_share_text(link)))
                .button(Button::callback(BACK_BUTTON, callback::BACK));
            Reply::with_keyboard(text, keyboard)
        }
        None => Reply::text("❌ Please follow the required channels first to get your referral link."),
    }
}

/// Answer to the `/check` command.
#[must_use]
pub fn invite_status(status: &InviteStatus, threshold: u32) -> Reply {
    match status {
        InviteStatus::Locked => Reply::text("❌ Please follow the required channels first."),
        InviteStatus::Unlocked { link } => Reply::text(format!(
            "📣 You have successfully invited {threshold} friends. \
             Now you can join the channel via this link 🔗: {link}"
        )),
        InviteStatus::Remaining(remaining) => Reply::text(format!(
            "You need to invite {remaining} more friends to get access to the channel."
        )),
    }
}

/// One-time message sent to a referrer who reached the threshold.
#[must_use]
pub fn unlock_notification(threshold: u32, link: &str) -> String {
    format!(
        "📣Congratulations! You have invited {threshold} friends. \
         You can now join the channel via this link 🔗: {link}"
    )
}

#[must_use]
pub fn user_not_found() -> Reply {
    Reply::text("User not found. Please start the bot again.")
}

#[must_use]
pub fn temporary_failure() -> Reply {
    Reply::text("⚠️ Something went wrong. Please try again in a moment.")
}

fn back_keyboard() -> Keyboard {
    Keyboard::new().button(Button::callback(BACK_BUTTON, callback::BACK))
}

fn invite_share_text(link: &str) -> String {
    format!("\n{CONFETTI}\n{INVITE_PITCH}\n{link}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::ButtonAction;

    fn callbacks(reply: &Reply) -> Vec<String> {
        reply
            .keyboard
            .iter()
            .flat_map(|k| k.buttons())
            .filter_map(|b| match &b.action {
                ButtonAction::Callback(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn urls(reply: &Reply) -> Vec<String> {
        reply
            .keyboard
            .iter()
            .flat_map(|k| k.buttons())
            .filter_map(|b| match &b.action {
                ButtonAction::Url(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_channel_prompt_has_join_buttons_and_check() {
        let reply = channel_prompt(&[Channel::new("@english_avenue"), Channel::new("@ielts_bus")]);
        assert_eq!(
            urls(&reply),
            ["https://t.me/english_avenue", "https://t.me/ielts_bus"]
        );
        assert_eq!(callbacks(&reply), [callback::CHECK_SUBSCRIPTION]);
    }

    #[test]
    fn test_private_channel_is_named_in_text() {
        let reply = missing_channels(&[Channel::new("-1001234567890")]);
        assert!(reply.text.contains("-1001234567890"));
        assert!(urls(&reply).is_empty());
    }

    #[test]
    fn test_main_menu_contains_link() {
        let reply = main_menu("Ann", "https://t.me/bot?start=7");
        assert!(reply.text.starts_with("Hello Ann!"));
        assert!(reply.text.contains("https://t.me/bot?start=7"));
        assert_eq!(callbacks(&reply), [callback::PROFILE, callback::REFERRAL_LINK]);
    }

    #[test]
    fn test_profile_variants() {
        let locked = ProfileView {
            invited_count: 0,
            remaining: 5,
            features_available: false,
            unlock_link: None,
        };
        assert!(profile("Ann", &locked).text.contains("follow the required channels"));

        let pending = ProfileView {
            invited_count: 2,
            remaining: 3,
            features_available: true,
            unlock_link: None,
        };
        let text = profile("Ann", &pending).text;
        assert!(text.contains("Invited friends: 2"));
        assert!(text.contains("Friends to invite for channel access: 3"));

        let unlocked = ProfileView {
            invited_count: 5,
            remaining: 0,
            features_available: true,
            unlock_link: Some("https://t.me/+secret".to_owned()),
        };
        assert!(profile("Ann", &unlocked).text.contains("https://t.me/+secret"));
    }

    #[test]
    fn test_invite_status_texts() {
        assert!(invite_status(&InviteStatus::Remaining(3), 5).text.contains("invite 3 more"));
        assert!(
            invite_status(
                &InviteStatus::Unlocked {
                    link: "https://t.me/+x".to_owned()
                },
                5
            )
            .text
            .contains("invited 5 friends")
        );
    }

    #[test]
    fn test_referral_link_gated() {
        assert!(referral_link(None).keyboard.is_none());
        let reply = referral_link(Some("https://t.me/bot?start=1"));
        assert!(reply.text.contains("https://t.me/bot?start=1"));
        assert_eq!(callbacks(&reply), [callback::BACK]);
    }
}
