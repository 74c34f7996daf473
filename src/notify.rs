//! Notification sink.
//!
//! `Notifier` is the seam between the scheduler and the outside world; the
//! production implementation posts to a Telegram channel.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;

/// Errors delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The Telegram API rejected or failed the send.
    #[error("telegram send failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

/// Sink that delivers fired trigger payloads.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to the given chat.
    ///
    /// A failure here is non-fatal to the scheduler: the trigger that
    /// produced the message is already spent and will not be retried.
    async fn send(&self, channel_id: i64, text: &str) -> Result<(), NotifyError>;
}

/// Telegram-backed notifier.
///
/// Posts with legacy Markdown parsing, which is what the frozen message
/// templates are written in.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    /// Create a notifier over an existing bot client.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, channel_id: i64, text: &str) -> Result<(), NotifyError> {
        self.bot
            .send_message(ChatId(channel_id), text)
            .parse_mode(ParseMode::Markdown)
            .await?;
        Ok(())
    }
}
