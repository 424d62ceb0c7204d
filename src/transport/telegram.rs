use super::{InboundMessage, InboundUpdate, Transport};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_SLACK: Duration = Duration::from_secs(10);
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<Sender>,
    text: Option<String>,
    caption: Option<String>,
    #[serde(default)]
    photo: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
    #[serde(default)]
    is_bot: bool,
}

/// Bot API client using long polling.
pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(token: &str, poll_timeout: Duration) -> AppResult<Self> {
        Self::with_api_base(API_BASE, token, poll_timeout)
    }

    pub fn with_api_base(api_base: &str, token: &str, poll_timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + REQUEST_SLACK)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            poll_timeout,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> AppResult<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let payload: ApiResponse<T> = response.json().await?;
        unwrap_response(method, status.as_u16(), payload)
    }
}

fn unwrap_response<T>(method: &str, status: u16, payload: ApiResponse<T>) -> AppResult<T> {
    if !payload.ok {
        let code = payload.error_code.unwrap_or(i64::from(status));
        let description = payload.description.unwrap_or_else(|| "no description".to_string());
        return Err(AppError::Transport(format!("{} failed ({}): {}", method, code, description)));
    }
    payload
        .result
        .ok_or_else(|| AppError::Transport(format!("{} returned no result", method)))
}

fn to_inbound(update: Update) -> InboundUpdate {
    let message = update.message.and_then(|message| {
        let sender = message.from.filter(|sender| !sender.is_bot)?;
        let text = message.text.or(message.caption)?;
        Some(InboundMessage {
            chat_id: message.chat.id,
            user_id: sender.id.to_string(),
            text,
            has_photo: !message.photo.is_empty(),
        })
    });

    InboundUpdate {
        update_id: update.update_id,
        message,
    }
}

fn truncate_message(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn authenticate(&self) -> AppResult<String> {
        let me: BotUser = self.call("getMe", json!({})).await?;
        Ok(me.username.unwrap_or_else(|| me.id.to_string()))
    }

    async fn poll(&self, offset: Option<i64>) -> AppResult<Vec<InboundUpdate>> {
        let mut body = json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let updates: Vec<Update> = self.call("getUpdates", body).await?;
        Ok(updates.into_iter().map(to_inbound).collect())
    }

    async fn send(&self, chat_id: i64, text: &str) -> AppResult<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": truncate_message(text),
                }),
            )
            .await?;
        Ok(())
    }
}
