//! Telegram-facing side of the broadcast engine and the membership check.
//!
//! Everything here maps teloxide errors onto the engine's error model.
//! The classification is deliberately narrow: only "this user will never
//! receive anything again" becomes [`DeliveryError::Forbidden`].

use super::broadcast::{BroadcastPayload, BroadcastTransport, DeliveryError, ProgressSink};
use anyhow::Context;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, Recipient};
use teloxide::{ApiError, RequestError};

/// Real transport sending through the Bot API.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl BroadcastTransport for TelegramTransport {
    async fn deliver(&self, tg_id: i64, payload: &BroadcastPayload) -> Result<(), DeliveryError> {
        let chat_id = ChatId(tg_id);
        let result = match payload {
            BroadcastPayload::Text(body) => {
                self.bot.send_message(chat_id, body).await.map(|_| ())
            }
            BroadcastPayload::Photo { file_id, caption } => {
                let photo = InputFile::file_id(FileId(file_id.clone()));
                let mut request = self.bot.send_photo(chat_id, photo);
                if !caption.is_empty() {
                    request = request.caption(caption);
                }
                request.await.map(|_| ())
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(RequestError::Api(ApiError::BotBlocked | ApiError::UserDeactivated)) => {
                Err(DeliveryError::Forbidden)
            }
            Err(e) => Err(DeliveryError::Other(e.to_string())),
        }
    }
}

/// Progress sink that keeps editing one status message in the admin chat.
pub struct StatusMessageProgress {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl StatusMessageProgress {
    /// Posts the initial status message and wires the sink to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial message cannot be sent.
    pub async fn start(bot: Bot, chat_id: ChatId) -> anyhow::Result<Self> {
        let message = bot
            .send_message(chat_id, "⏳ Розсилка розпочата...")
            .await
            .context("failed to post broadcast status message")?;
        Ok(Self {
            bot,
            chat_id,
            message_id: message.id,
        })
    }
}

#[async_trait]
impl ProgressSink for StatusMessageProgress {
    async fn progress(&self, processed: usize, total: usize) {
        // Progress is cosmetic, an edit failure must not abort the run
        let text = format!("⏳ Надіслано {processed} з {total}...");
        let _ = self
            .bot
            .edit_message_text(self.chat_id, self.message_id, text)
            .await;
    }
}

/// Checks whether the user is a present member of the main channel.
///
/// "Present" means member, administrator or owner; `left` and `kicked`
/// count as not subscribed.
///
/// # Errors
///
/// Propagates API errors so the caller can decide not to cache them.
pub async fn is_channel_member(bot: &Bot, channel: &str, tg_id: i64) -> anyhow::Result<bool> {
    let member = bot
        .get_chat_member(
            Recipient::ChannelUsername(channel.to_string()),
            UserId(tg_id.cast_unsigned()),
        )
        .await
        .context("getChatMember failed")?;
    Ok(member.is_present())
}
