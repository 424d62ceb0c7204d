pub mod telegram;

use crate::errors::AppResult;
use async_trait::async_trait;

/// A chat message that may carry a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub user_id: String,
    pub text: String,
    pub has_photo: bool,
}

/// One polled update. Updates without a usable message still advance the
/// polling offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub message: Option<InboundMessage>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Checks the credential and returns the bot's display name.
    async fn authenticate(&self) -> AppResult<String>;
    async fn poll(&self, offset: Option<i64>) -> AppResult<Vec<InboundUpdate>>;
    async fn send(&self, chat_id: i64, text: &str) -> AppResult<()>;
}
