use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::media::{artifact_from_bytes, download_media};
use crate::paperdoll::ports::PipelineArtifact;

pub async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token, file.path
    ))
}

/// The photo carried by a message: the largest photo size, or an image
/// sent as a document (uncompressed).
fn photo_file_id(message: &Message) -> Option<(FileId, &'static str)> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        return Some((photo.file.id.clone(), "image/jpeg"));
    }
    let document = message.document()?;
    let mime = document.mime_type.as_ref()?;
    if mime.type_() != "image" {
        return None;
    }
    Some((document.file.id.clone(), "image/png"))
}

async fn download_photo(bot: &Bot, file_id: &FileId, fallback_mime: &str) -> Option<PipelineArtifact> {
    let url = match get_file_url(bot, file_id).await {
        Ok(url) => url,
        Err(err) => {
            warn!("Failed to resolve photo file: {err}");
            return None;
        }
    };
    let bytes = download_media(&url).await?;
    debug!("Downloaded photo ({} bytes)", bytes.len());
    Some(artifact_from_bytes(bytes, fallback_mime))
}

/// Photo in the message itself, else in the message it replies to.
pub async fn collect_photo(bot: &Bot, message: &Message) -> Option<PipelineArtifact> {
    let source = photo_file_id(message).or_else(|| {
        message
            .reply_to_message()
            .and_then(photo_file_id)
    });
    let (file_id, fallback_mime) = source?;
    download_photo(bot, &file_id, fallback_mime).await
}

/// True when a photo is attached to the message or to the replied-to one.
pub fn has_photo(message: &Message) -> bool {
    photo_file_id(message).is_some()
        || message
            .reply_to_message()
            .map(|reply| photo_file_id(reply).is_some())
            .unwrap_or(false)
}
