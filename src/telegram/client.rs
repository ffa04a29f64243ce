//! Telegram Bot API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::types::{ApiResponse, ChatMember, Update, User};
use super::{
    Keyboard, MembershipStatus, Platform, PlatformError, PlatformErrorKind, RateLimiter, UpdateSource,
};
use crate::config::Channel;
use crate::registry::UserId;

/// Default Bot API endpoint.
const API_BASE: &str = "https://api.telegram.org";

/// Extra time the HTTP client waits beyond the long-polling timeout.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Update kinds the bot subscribes to.
const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

/// High-level Bot API client.
pub struct BotApiClient {
    http: reqwest::Client,

    /// `https://api.telegram.org/bot<token>`; never logged.
    endpoint: String,

    /// Rate limiter for outbound messages.
    rate_limiter: RateLimiter,
}

impl BotApiClient {
    /// Creates a client for the given bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        token: &str,
        send_interval: Duration,
        poll_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        Self::with_api_base(API_BASE, token, send_interval, poll_timeout)
    }

    /// Creates a client against a custom Bot API server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_api_base(
        api_base: &str,
        token: &str,
        send_interval: Duration,
        poll_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + HTTP_TIMEOUT_MARGIN)
            .build()
            .map_err(|e| PlatformError::new(PlatformErrorKind::Network, e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{token}", api_base.trim_end_matches('/')),
            rate_limiter: RateLimiter::new(send_interval),
        })
    }

    /// Returns the bot's own account.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or the request fails.
    pub async fn get_me(&self) -> Result<User, PlatformError> {
        let me: User = self.call("getMe", &json!({})).await?;
        info!(
            "Authorized as @{} ({})",
            me.username.as_deref().unwrap_or("<no username>"),
            me.id
        );
        Ok(me)
    }

    /// Invokes a Bot API method and unwraps the answer envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<T, PlatformError> {
        let url = format!("{}/{method}", self.endpoint);

        // Bot API answers with a JSON envelope on error statuses as well.
        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| PlatformError::new(PlatformErrorKind::Network, e.without_url().to_string()))?;

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            PlatformError::new(PlatformErrorKind::InvalidResponse, e.without_url().to_string())
        })?;

        envelope.into_result()
    }

    /// Invokes a message-producing method through the rate limiter.
    async fn call_throttled(&self, method: &str, params: &Value) -> Result<(), PlatformError> {
        let waited = self.rate_limiter.wait_and_acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit before {}", waited, method);
        }

        match self.call::<Value>(method, params).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if let PlatformErrorKind::FloodWait(seconds) = err.kind {
                    self.rate_limiter.handle_flood_wait(seconds).await;
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl UpdateSource for BotApiClient {
    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, PlatformError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ALLOWED_UPDATES,
            }),
        )
        .await
    }
}

#[async_trait]
impl Platform for BotApiClient {
    async fn membership_status(
        &self,
        channel: &Channel,
        user_id: UserId,
    ) -> Result<MembershipStatus, PlatformError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": channel.as_str(), "user_id": user_id.0 }),
            )
            .await?;
        debug!("User {} in {}: {:?}", user_id, channel, member.status);
        Ok(member.status)
    }

    async fn send_message(
        &self,
        chat: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        let mut params = json!({ "chat_id": chat.0, "text": text });
        attach_keyboard(&mut params, keyboard);
        self.call_throttled("sendMessage", &params).await
    }

    async fn edit_message(
        &self,
        chat: UserId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        let mut params = json!({ "chat_id": chat.0, "message_id": message_id, "text": text });
        attach_keyboard(&mut params, keyboard);
        self.call_throttled("editMessageText", &params).await
    }

    async fn answer_callback(&self, query_id: &str) -> Result<(), PlatformError> {
        // Not a chat message, so it bypasses the send limiter.
        let answered: bool = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": query_id }))
            .await?;
        if !answered {
            warn!("Callback query {} was not acknowledged", query_id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BotApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiClient")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

fn attach_keyboard(params: &mut Value, keyboard: Option<&Keyboard>) {
    if let (Some(keyboard), Value::Object(map)) = (keyboard, params) {
        match serde_json::to_value(keyboard) {
            Ok(markup) => {
                map.insert("reply_markup".to_owned(), markup);
            }
            Err(e) => warn!("Failed to serialize keyboard, sending without it: {}", e),
        }
    }
}
