use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::detect_mime_type;
use crate::paperdoll::ports::{ImageGenerator, PipelineArtifact, VisionService};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;
const GEMINI_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const IMAGE_SYSTEM_INSTRUCTION: &str =
    "Generate an image based on the prompt. CRITICAL: respond with an image, NOT TEXT.";
const IMAGE_EDIT_SYSTEM_INSTRUCTION: &str =
    "Use the attached image as the reference and follow the prompt. CRITICAL: respond with an image, NOT TEXT.";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyProfile {
    Permissive,
    Standard,
}

impl SafetyProfile {
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "standard" => SafetyProfile::Standard,
            "permissive" | "off" | "none" | "" => SafetyProfile::Permissive,
            other => {
                warn!(
                    "Unknown GEMINI_SAFETY_SETTINGS value '{}', using permissive defaults.",
                    other
                );
                SafetyProfile::Permissive
            }
        }
    }

    fn threshold(self) -> &'static str {
        match self {
            SafetyProfile::Standard => "BLOCK_MEDIUM_AND_ABOVE",
            SafetyProfile::Permissive => "OFF",
        }
    }
}

/// Gemini `generateContent` client backing both the vision and the image ports.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    vision_model: String,
    image_model: String,
    safety: SafetyProfile,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        vision_model: impl Into<String>,
        image_model: impl Into<String>,
        safety: SafetyProfile,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            vision_model: vision_model.into(),
            image_model: image_model.into(),
            safety,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.gemini_api_key.trim();
        if api_key.is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required"));
        }
        Ok(Self::new(
            api_key,
            config.gemini_vision_model.clone(),
            config.gemini_image_model.clone(),
            SafetyProfile::from_setting(&config.gemini_safety_settings),
        ))
    }

    fn redact(&self, text: &str) -> String {
        redact_api_key(text, &self.api_key)
    }

    async fn call_api(&self, model: &str, payload: Value, label: &str) -> Result<GeminiResponse> {
        let client = get_http_client();
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, model, self.api_key
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload, label);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match client
                .post(&url)
                .timeout(GEMINI_REQUEST_TIMEOUT)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact(&err.to_string());
                    let should_retry =
                        gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(gemini_retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Gemini request failed: {}", err_text));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&self.redact(&body));
                let should_retry =
                    gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.unwrap_or(body_summary);
                return Err(anyhow!(
                    "Gemini request failed with status {}: {}",
                    status,
                    detail
                ));
            }

            let value = response
                .json::<GeminiResponse>()
                .await
                .map_err(|err| anyhow!("Gemini response decode failed: {}", self.redact(&err.to_string())))?;
            if tracing::enabled!(tracing::Level::DEBUG) {
                let response_summary = summarize_gemini_response(&value);
                debug!(target: "llm.gemini", model = model, response = %response_summary);
            }
            return Ok(value);
        }
    }
}

#[async_trait]
impl VisionService for GeminiClient {
    async fn analyze_image(
        &self,
        image: &PipelineArtifact,
        instruction: &str,
    ) -> Result<Option<String>> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": build_parts(instruction, Some(image)) }],
            "generationConfig": { "temperature": 0.2 },
            "safetySettings": build_safety_settings(self.safety),
        });
        let metadata = json!({ "image_bytes": image.len(), "mime_type": image.mime_type() });

        log_llm_timing(
            "gemini",
            &self.vision_model,
            "analyze_image",
            Some(metadata),
            || async {
                let response = self
                    .call_api(&self.vision_model, payload, "feature_extraction")
                    .await?;
                let text = extract_text_from_response(response);
                Ok(if text.trim().is_empty() { None } else { Some(text) })
            },
        )
        .await
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(
        &self,
        instruction: &str,
        reference: Option<&PipelineArtifact>,
    ) -> Result<Option<PipelineArtifact>> {
        let system_instruction = if reference.is_some() {
            IMAGE_EDIT_SYSTEM_INSTRUCTION
        } else {
            IMAGE_SYSTEM_INSTRUCTION
        };
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "role": "user", "parts": build_parts(instruction, reference) }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
            "safetySettings": build_safety_settings(self.safety),
        });
        let metadata = json!({
            "prompt_chars": instruction.chars().count(),
            "reference_bytes": reference.map(PipelineArtifact::len),
        });

        log_llm_timing(
            "gemini",
            &self.image_model,
            "generate_image",
            Some(metadata),
            || async {
                let response = self
                    .call_api(&self.image_model, payload, "image_generation")
                    .await?;
                let image = extract_images_from_response(response).into_iter().next();
                if image.is_none() {
                    warn!("No image part returned by Gemini (model: {})", self.image_model);
                }
                Ok(image)
            },
        )
        .await
    }
}

fn redact_api_key(text: &str, key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings(profile: SafetyProfile) -> Vec<Value> {
    let threshold = profile.threshold();
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
        "HARM_CATEGORY_CIVIC_INTEGRITY",
    ]
    .iter()
    .map(|category| json!({ "category": category, "threshold": threshold }))
    .collect()
}

/// Reference image first, instruction last.
fn build_parts(instruction: &str, image: Option<&PipelineArtifact>) -> Vec<Value> {
    let mut parts = Vec::new();
    if let Some(image) = image {
        parts.push(json!({
            "inlineData": {
                "mimeType": normalize_gemini_mime_type(image.mime_type()),
                "data": general_purpose::STANDARD.encode(image.bytes()),
            }
        }));
    }
    parts.push(json!({ "text": instruction }));
    parts
}

fn normalize_gemini_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        "" => "image/png".to_string(),
        _ => lowered,
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value, label: &str) -> Value {
    let mut summary = Map::new();
    summary.insert("label".to_string(), Value::String(label.to_string()));

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized: Vec<Value> = contents
            .iter()
            .map(|content| {
                let role = content
                    .get("role")
                    .and_then(|value| value.as_str())
                    .unwrap_or("user");
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_gemini_parts(parts))
                    .unwrap_or_default();
                json!({ "role": role, "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for part in response_parts(response) {
        match part {
            GeminiPart::Text { text } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if inline_data.mime_type.starts_with("image/") {
                    image_parts += 1;
                }
            }
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn response_parts(response: &GeminiResponse) -> impl Iterator<Item = &GeminiPart> {
    response
        .candidates
        .iter()
        .flatten()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for part in response_parts(&response) {
        if let GeminiPart::Text { text } = part {
            if !text.trim().is_empty() {
                text_parts.push(text.as_str());
            }
        }
    }
    text_parts.join("\n")
}

fn extract_images_from_response(response: GeminiResponse) -> Vec<PipelineArtifact> {
    let mut images = Vec::new();
    for part in response_parts(&response) {
        if let GeminiPart::InlineData { inline_data } = part {
            if !inline_data.mime_type.starts_with("image/") {
                continue;
            }
            match general_purpose::STANDARD.decode(&inline_data.data) {
                Ok(bytes) if !bytes.is_empty() => {
                    let mime_type = detect_mime_type(&bytes)
                        .filter(|mime| mime.starts_with("image/"))
                        .unwrap_or_else(|| normalize_gemini_mime_type(&inline_data.mime_type));
                    images.push(PipelineArtifact::new(bytes, mime_type));
                }
                Ok(_) => {}
                Err(err) => warn!("Discarding undecodable Gemini image part: {err}"),
            }
        }
    }
    images
}
