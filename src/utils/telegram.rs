use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, MessageId, ReplyParameters};
use teloxide::RequestError;
use tokio::task::JoinHandle;
use tracing::warn;

const CHAT_ACTION_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);
const TELEGRAM_RETRY_ATTEMPTS: usize = 3;

/// Repeats a chat action ("uploading photo…") until dropped.
pub struct ChatActionHeartbeat {
    task_handle: Option<JoinHandle<()>>,
}

impl Drop for ChatActionHeartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

pub fn start_chat_action_heartbeat(
    bot: Bot,
    chat_id: ChatId,
    action: ChatAction,
) -> ChatActionHeartbeat {
    let task_handle = tokio::spawn(async move {
        loop {
            if let Err(err) = bot.send_chat_action(chat_id, action.clone()).await {
                warn!("send_chat_action failed: {err}");
            }
            tokio::time::sleep(CHAT_ACTION_HEARTBEAT_INTERVAL).await;
        }
    });

    ChatActionHeartbeat {
        task_handle: Some(task_handle),
    }
}

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

async fn with_telegram_retry<T, F, Fut>(operation: &str, mut send: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match send().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !telegram_retryable_error(&err) || attempt >= TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err.into());
                }
                warn!("{} attempt {} failed: {err}", operation, attempt);
                if let RequestError::RetryAfter(wait) = err {
                    tokio::time::sleep(wait.duration()).await;
                } else {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

pub async fn send_message_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    with_telegram_retry("send_message", || {
        let mut request = bot.send_message(chat_id, text.to_string());
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        async move { request.await }
    })
    .await
}

/// Status edits are cosmetic; "message is not modified" and similar errors are logged only.
pub async fn edit_status(bot: &Bot, chat_id: ChatId, message_id: MessageId, text: &str) {
    let result = with_telegram_retry("edit_message_text", || {
        let request = bot.edit_message_text(chat_id, message_id, text.to_string());
        async move { request.await }
    })
    .await;
    if let Err(err) = result {
        warn!("Failed to update status message: {err}");
    }
}

pub async fn send_photo_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    image: &[u8],
    file_name: &str,
    caption: &str,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    with_telegram_retry("send_photo", || {
        let input = InputFile::memory(image.to_vec()).file_name(file_name.to_string());
        let mut request = bot.send_photo(chat_id, input).caption(caption.to_string());
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        async move { request.await }
    })
    .await
}

/// Sends large sheets as documents so Telegram does not recompress them.
pub async fn send_document_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    bytes: &[u8],
    file_name: &str,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    with_telegram_retry("send_document", || {
        let input = InputFile::memory(bytes.to_vec()).file_name(file_name.to_string());
        let mut request = bot.send_document(chat_id, input);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        async move { request.await }
    })
    .await
}
