//! Minimal Telegram Bot API client: long polling and `sendMessage`.
//!
//! Only the calls the bot needs are implemented. Requests go to
//! `{api_url}/bot{token}/{method}`; the token is never logged.

use crate::delivery::MessageSink;
use crate::error::TelegramError;
use crate::models::OutboundMessage;
use crate::session::ChatId;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

/// One inbound update. Only message updates are requested.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyKeyboard>,
}

#[derive(Debug, Serialize)]
struct ReplyKeyboard {
    keyboard: Vec<Vec<KeyboardButton>>,
    resize_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct KeyboardButton {
    text: String,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Bot API client. Cloning shares the connection pool.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(TelegramError::Api(
                description.unwrap_or_else(|| format!("{method} returned no result")),
            )),
        }
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout_secs`.
    #[instrument(level = "trace", skip(self))]
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &body,
                Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT,
            )
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), "Received updates");
        }
        Ok(updates)
    }

    /// Send `message` to `chat`.
    pub async fn send_message(&self, chat: ChatId, message: &OutboundMessage) -> Result<(), TelegramError> {
        let body = SendMessage {
            chat_id: chat,
            text: &message.text,
            parse_mode: message.html.then_some("HTML"),
            disable_web_page_preview: message.disable_preview,
            reply_markup: message.keyboard.as_ref().map(|buttons| ReplyKeyboard {
                keyboard: buttons
                    .iter()
                    .map(|b| vec![KeyboardButton { text: b.clone() }])
                    .collect(),
                resize_keyboard: true,
            }),
        };
        let _: serde_json::Value = self.call("sendMessage", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    async fn send(&self, chat: ChatId, message: OutboundMessage) -> Result<(), TelegramError> {
        self.send_message(chat, &message).await
    }
}
