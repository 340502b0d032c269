use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use crate::paperdoll::ports::PipelineArtifact;
use crate::utils::http::get_http_client;

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Wraps raw upload bytes, sniffing the MIME type and falling back to the caller's hint.
pub fn artifact_from_bytes(bytes: Vec<u8>, fallback_mime: &str) -> PipelineArtifact {
    let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| fallback_mime.to_string());
    PipelineArtifact::new(bytes, mime_type)
}

/// Unwraps `data:<mime>;base64,<payload>`; plain base64 is accepted and sniffed.
pub fn strip_data_url(value: &str) -> Option<PipelineArtifact> {
    let trimmed = value.trim();
    let (declared_mime, encoded) = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',')?;
            let mime = header.strip_suffix(";base64")?;
            (Some(mime.trim().to_ascii_lowercase()), payload)
        }
        None => (None, trimmed),
    };

    let bytes = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    let mime_type = declared_mime
        .filter(|mime| !mime.is_empty())
        .or_else(|| detect_mime_type(&bytes))
        .unwrap_or_else(|| "image/png".to_string());
    Some(PipelineArtifact::new(bytes, mime_type))
}

/// Loads a reference image that may be stored either as raw image bytes or
/// as a text file holding a `data:` URL.
pub fn reference_from_bytes(bytes: Vec<u8>, fallback_mime: &str) -> Option<PipelineArtifact> {
    if bytes.is_empty() {
        return None;
    }
    match std::str::from_utf8(&bytes) {
        Ok(text) if text.trim_start().starts_with("data:") => strip_data_url(text),
        _ => Some(artifact_from_bytes(bytes, fallback_mime)),
    }
}

/// Re-encodes the photo as JPEG when its long edge exceeds `max_edge`.
///
/// Photos within bounds, and payloads the decoder does not understand (HEIC),
/// are returned unchanged.
pub fn downscale_photo(photo: PipelineArtifact, max_edge: u32) -> Result<PipelineArtifact> {
    let image = match image::load_from_memory(photo.bytes()) {
        Ok(image) => image,
        Err(err) => {
            debug!("Skipping downscale for {}: {err}", photo.mime_type());
            return Ok(photo);
        }
    };

    let (width, height) = image.dimensions();
    if width.max(height) <= max_edge {
        return Ok(photo);
    }

    let resized = image.resize(max_edge, max_edge, FilterType::Lanczos3);
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(resized.to_rgb8())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .context("encode downscaled photo")?;
    debug!(
        "Downscaled photo {}x{} -> {}x{} ({} -> {} bytes)",
        width,
        height,
        resized.width(),
        resized.height(),
        photo.len(),
        buf.len()
    );
    Ok(PipelineArtifact::new(buf, "image/jpeg"))
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Fetches a Telegram file URL. Failures are logged and collapse to `None`.
pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let client = get_http_client();
    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
        let last_attempt = attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS;

        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                let retryable = should_retry_error(&err);
                // File URLs embed the bot token.
                let timeout = err.is_timeout();
                let connect = err.is_connect();
                warn!(
                    "Failed to fetch media: {} (timeout={}, connect={}, attempt={}/{})",
                    err.without_url(),
                    timeout,
                    connect,
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if !retryable || last_attempt {
                    return None;
                }
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Media download failed with status {}: {}",
                status,
                truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
            );
            if !should_retry_status(status) || last_attempt {
                return None;
            }
            tokio::time::sleep(delay).await;
            continue;
        }

        match response.bytes().await {
            Ok(bytes) => return Some(bytes.to_vec()),
            Err(err) => {
                error!(
                    "Failed to read media bytes: {} (attempt={}/{})",
                    err.without_url(),
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if last_attempt {
                    return None;
                }
                tokio::time::sleep(delay).await;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn sniffs_png_and_heic() {
        assert_eq!(detect_mime_type(&png_of(2, 2)).as_deref(), Some("image/png"));

        let mut heic = vec![0, 0, 0, 24];
        heic.extend_from_slice(b"ftypheic");
        heic.extend_from_slice(&[0; 8]);
        assert_eq!(detect_mime_type(&heic).as_deref(), Some("image/heic"));
        assert_eq!(detect_mime_type(b"hello"), None);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let png = png_of(1, 1);
        let encoded = general_purpose::STANDARD.encode(&png);

        let artifact = strip_data_url(&format!("data:image/webp;base64,{encoded}")).unwrap();
        assert_eq!(artifact.mime_type(), "image/webp");
        assert_eq!(artifact.bytes(), png.as_slice());

        let artifact = strip_data_url(&encoded).unwrap();
        assert_eq!(artifact.mime_type(), "image/png");

        assert!(strip_data_url("data:image/png,notbase64").is_none());
        assert!(strip_data_url("%%%").is_none());
        assert!(strip_data_url("").is_none());
    }

    #[test]
    fn references_accept_raw_bytes_or_data_urls() {
        let png = png_of(2, 2);
        let raw = reference_from_bytes(png.clone(), "image/jpeg").unwrap();
        assert_eq!(raw.mime_type(), "image/png");

        let text = format!(
            "data:image/jpeg;base64,{}\n",
            general_purpose::STANDARD.encode(&png)
        );
        let unwrapped = reference_from_bytes(text.into_bytes(), "image/png").unwrap();
        assert_eq!(unwrapped.mime_type(), "image/jpeg");
        assert_eq!(unwrapped.bytes(), png.as_slice());

        assert!(reference_from_bytes(Vec::new(), "image/jpeg").is_none());
        assert!(reference_from_bytes(b"data:broken".to_vec(), "image/jpeg").is_none());
    }

    #[test]
    fn large_photos_are_downscaled_to_jpeg() {
        let photo = artifact_from_bytes(png_of(400, 100), "image/png");
        let scaled = downscale_photo(photo, 200).unwrap();
        assert_eq!(scaled.mime_type(), "image/jpeg");
        let decoded = image::load_from_memory(scaled.bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (200, 50));
    }

    #[test]
    fn small_or_undecodable_photos_pass_through() {
        let photo = artifact_from_bytes(png_of(64, 64), "image/png");
        let same = downscale_photo(photo.clone(), 200).unwrap();
        assert_eq!(same, photo);

        let opaque = PipelineArtifact::new(vec![1, 2, 3], "image/heic");
        assert_eq!(downscale_photo(opaque.clone(), 200).unwrap(), opaque);
    }
}
