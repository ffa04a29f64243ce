//! Bot API wire types.
//!
//! Only the fields the bot reads are declared; everything else is ignored.

use serde::Deserialize;

use super::{MembershipStatus, PlatformError, PlatformErrorKind};

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i32>,
    pub parameters: Option<ResponseParameters>,
}

impl<T> ApiResponse<T> {
    /// Converts the envelope into the result or a classified error.
    pub fn into_result(self) -> Result<T, PlatformError> {
        if self.ok {
            return self.result.ok_or_else(|| {
                PlatformError::new(PlatformErrorKind::InvalidResponse, "ok response without result")
            });
        }

        let description = self.description.unwrap_or_default();
        let retry_after = self.parameters.and_then(|p| p.retry_after);
        Err(PlatformError::from_api(self.error_code, &description, retry_after))
    }
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// Absent when the originating message is too old to be delivered.
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// `ChatMember` answer of `getChatMember`; only the status is used.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: MembershipStatus,
}
