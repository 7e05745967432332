//! Thin Telegram Bot API client over `reqwest`: long polling plus the two send calls the bot needs.

use async_trait::async_trait;
use log::debug;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::{
    config::{BotConfig, RuntimeConfig},
    visual::Screenshot,
};

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram api error: {description}")]
    Api { description: String },
    #[error("could not read photo: {0}")]
    Photo(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TelegramError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api {
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

/// Text formatting for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Plain,
    /// Legacy Markdown with link previews off.
    Markdown,
}

/// Outgoing side of the chat, so the bot loop can be driven without Telegram.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, mode: TextMode) -> Result<(), TelegramError>;

    /// Uploads `image` with a Markdown caption.
    async fn send_photo(
        &self,
        chat_id: i64,
        image: &Screenshot,
        caption: &str,
    ) -> Result<(), TelegramError>;
}

pub struct TelegramClient {
    http: Client,
    base_url: String,
    long_poll_timeout: u64,
}

impl TelegramClient {
    pub fn new(config: &BotConfig, runtime: &RuntimeConfig) -> Result<Self, reqwest::Error> {
        // Long polls hold the connection open, so the client timeout must outlast them.
        let http = Client::builder()
            .timeout(Duration::from_secs(runtime.long_poll_timeout_secs + 10))
            .build()?;
        Ok(Self {
            http,
            base_url: format!(
                "{}/bot{}",
                config.telegram_api_url.trim_end_matches('/'),
                config.bot_token
            ),
            long_poll_timeout: runtime.long_poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, TelegramError> {
        let response: ApiResponse<T> = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Blocks up to the long-poll timeout waiting for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdates {
            offset,
            timeout: self.long_poll_timeout,
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &request).await
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str, mode: TextMode) -> Result<(), TelegramError> {
        let request = SendMessage {
            chat_id,
            text,
            parse_mode: match mode {
                TextMode::Plain => None,
                TextMode::Markdown => Some("Markdown"),
            },
            disable_web_page_preview: mode == TextMode::Markdown,
        };
        let _: Message = self.call("sendMessage", &request).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        image: &Screenshot,
        caption: &str,
    ) -> Result<(), TelegramError> {
        let bytes = image.read().await?;
        debug!("Uploading {} ({} bytes) to chat {}", image.file_name(), bytes.len(), chat_id);

        let photo = Part::bytes(bytes)
            .file_name(image.file_name())
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown")
            .part("photo", photo);

        let response: ApiResponse<Message> = self
            .http
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()?;
        Ok(())
    }
}
