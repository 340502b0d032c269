use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::paperdoll::ports::{PipelineArtifact, VisionService};

/// Literal written for attributes the photo did not reveal.
pub const UNKNOWN_SENTINEL: &str = "unknown";

const SENTINEL_SPELLINGS: [&str; 9] = [
    "", "null", "unknown", "none", "n/a", "없음", "모름", "알 수 없음", "불명",
];

const GLASSES_WORDS: [&str; 3] = ["안경", "glasses", "spectacles"];

/// Phrases that state the absence of glasses rather than describe a pair.
const NO_GLASSES_MARKERS: [&str; 16] = [
    "안경 없",
    "안경없",
    "없음",
    "미착용",
    "쓰지 않",
    "끼지 않",
    "착용하지 않",
    "안 쓴",
    "안쓴",
    "안 써",
    "no glasses",
    "not wear",
    "n't wear",
    "without glasses",
    "none",
    "false",
];

fn states_no_glasses(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered == "no" || NO_GLASSES_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Glasses values are only kept when they describe a pair actually worn.
fn normalize_glasses(value: FeatureValue) -> FeatureValue {
    match value {
        FeatureValue::Known(text) if states_no_glasses(&text) => FeatureValue::Unknown,
        other => other,
    }
}

/// The clause of a free-text description that mentions glasses being worn.
fn glasses_clause(text: &str) -> Option<&str> {
    text.split(|ch: char| matches!(ch, ',' | '.' | ';' | '\n' | '/'))
        .map(str::trim)
        .find(|clause| {
            let lowered = clause.to_lowercase();
            GLASSES_WORDS.iter().any(|word| lowered.contains(word))
        })
        .filter(|clause| !states_no_glasses(clause))
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("feature extraction returned no text")]
    EmptyResponse,
    #[error("feature extraction response could not be parsed: {0}")]
    ParseFailure(String),
    #[error("feature extraction call failed: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    Gender,
    Age,
    SkinTone,
    HairStyle,
    HairColor,
    EyeColor,
    FaceShape,
    FaceFeatures,
    Eyes,
    Glasses,
    BodyType,
    Posture,
    ClothingStyleHint,
    Accessories,
    Distinctive,
    Summary,
    Emotion,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 17] = [
        FeatureKey::Gender,
        FeatureKey::Age,
        FeatureKey::SkinTone,
        FeatureKey::HairStyle,
        FeatureKey::HairColor,
        FeatureKey::EyeColor,
        FeatureKey::FaceShape,
        FeatureKey::FaceFeatures,
        FeatureKey::Eyes,
        FeatureKey::Glasses,
        FeatureKey::BodyType,
        FeatureKey::Posture,
        FeatureKey::ClothingStyleHint,
        FeatureKey::Accessories,
        FeatureKey::Distinctive,
        FeatureKey::Summary,
        FeatureKey::Emotion,
    ];

    /// JSON key in the extraction schema.
    pub fn json_key(self) -> &'static str {
        match self {
            FeatureKey::Gender => "gender",
            FeatureKey::Age => "age",
            FeatureKey::SkinTone => "skin_tone",
            FeatureKey::HairStyle => "hair_style",
            FeatureKey::HairColor => "hair_color",
            FeatureKey::EyeColor => "eye_color",
            FeatureKey::FaceShape => "face_shape",
            FeatureKey::FaceFeatures => "face_features",
            FeatureKey::Eyes => "eyes",
            FeatureKey::Glasses => "glasses",
            FeatureKey::BodyType => "body_type",
            FeatureKey::Posture => "posture",
            FeatureKey::ClothingStyleHint => "clothing_style_hint",
            FeatureKey::Accessories => "accessories",
            FeatureKey::Distinctive => "distinctive",
            FeatureKey::Summary => "summary",
            FeatureKey::Emotion => "emotion",
        }
    }

    /// Label used when the attribute is rendered into an instruction.
    pub fn label(self) -> &'static str {
        match self {
            FeatureKey::Gender => "Gender",
            FeatureKey::Age => "Age",
            FeatureKey::SkinTone => "Skin tone",
            FeatureKey::HairStyle => "Hair style",
            FeatureKey::HairColor => "Hair color",
            FeatureKey::EyeColor => "Eye color / eye impression",
            FeatureKey::FaceShape => "Face shape",
            FeatureKey::FaceFeatures => "Face features",
            FeatureKey::Eyes => "Eyes",
            FeatureKey::Glasses => "Glasses",
            FeatureKey::BodyType => "Body type",
            FeatureKey::Posture => "Posture",
            FeatureKey::ClothingStyleHint => "Clothing style hint",
            FeatureKey::Accessories => "Accessories",
            FeatureKey::Distinctive => "Distinctive marks",
            FeatureKey::Summary => "Summary",
            FeatureKey::Emotion => "Mood / expression",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One attribute value: a concrete description or the unknown sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureValue {
    Known(String),
    Unknown,
}

impl FeatureValue {
    /// Normalises free text; every spelling of "nothing there" becomes `Unknown`.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();
        if SENTINEL_SPELLINGS.iter().any(|s| *s == lowered) {
            FeatureValue::Unknown
        } else {
            FeatureValue::Known(trimmed.to_string())
        }
    }

    fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => FeatureValue::Unknown,
            Some(Value::String(text)) => FeatureValue::from_text(text),
            Some(Value::Array(items)) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => text.trim().to_string(),
                        other => other.to_string(),
                    })
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                FeatureValue::from_text(&joined)
            }
            Some(other) => FeatureValue::from_text(&other.to_string()),
        }
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            FeatureValue::Known(text) => Some(text.as_str()),
            FeatureValue::Unknown => None,
        }
    }

    /// The value as written into instructions; unknown renders as the sentinel.
    pub fn display(&self) -> &str {
        self.as_known().unwrap_or(UNKNOWN_SENTINEL)
    }
}

/// Where a feature set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSource {
    Extracted,
    /// Typed by the user; only the summary and a glasses mention are structured.
    Manual,
}

/// Structured visual description of the person in one uploaded photo.
///
/// Built once and never edited; a corrected description replaces the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    values: Vec<FeatureValue>,
    source: FeatureSource,
}

impl FeatureSet {
    /// Parses a JSON object following the extraction schema. Missing keys
    /// become `Unknown` rather than being dropped.
    pub fn from_json_value(value: &Value) -> Result<Self, ExtractionError> {
        let object = value.as_object().ok_or_else(|| {
            ExtractionError::ParseFailure("extraction result is not a JSON object".to_string())
        })?;
        let values = FeatureKey::ALL
            .iter()
            .map(|key| {
                let value = FeatureValue::from_json(object.get(key.json_key()));
                if *key == FeatureKey::Glasses {
                    normalize_glasses(value)
                } else {
                    value
                }
            })
            .collect();
        Ok(Self {
            values,
            source: FeatureSource::Extracted,
        })
    }

    /// Locates the first balanced `{...}` span in `text` and parses it.
    pub fn from_response_text(text: &str) -> Result<Self, ExtractionError> {
        let span = extract_json_span(text).ok_or_else(|| {
            ExtractionError::ParseFailure("no JSON object found in response".to_string())
        })?;
        let value: Value = serde_json::from_str(span)
            .map_err(|err| ExtractionError::ParseFailure(err.to_string()))?;
        Self::from_json_value(&value)
    }

    /// Manual fallback: the user typed a description instead of uploading a photo.
    pub fn from_manual_text(text: &str) -> Self {
        let mut values = vec![FeatureValue::Unknown; FeatureKey::ALL.len()];
        values[FeatureKey::Summary.index()] = FeatureValue::from_text(text);
        if let Some(clause) = glasses_clause(text) {
            values[FeatureKey::Glasses.index()] = FeatureValue::from_text(clause);
        }
        Self {
            values,
            source: FeatureSource::Manual,
        }
    }

    pub fn source(&self) -> FeatureSource {
        self.source
    }

    pub fn get(&self, key: FeatureKey) -> &FeatureValue {
        &self.values[key.index()]
    }

    pub fn summary(&self) -> &FeatureValue {
        self.get(FeatureKey::Summary)
    }

    /// Concrete glasses description, if the input stated one.
    pub fn glasses(&self) -> Option<&str> {
        self.get(FeatureKey::Glasses).as_known()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureKey, &FeatureValue)> {
        FeatureKey::ALL.iter().map(move |key| (*key, self.get(*key)))
    }

    /// One `- Label: value` line per attribute, unknowns included.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("- {}: {}", key.label(), value.display()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Short text for history rows and captions.
    pub fn summary_text(&self) -> String {
        match self.summary().as_known() {
            Some(summary) => summary.to_string(),
            None => FeatureKey::ALL
                .iter()
                .filter_map(|key| self.get(*key).as_known())
                .take(4)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FeatureKey::ALL.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key.json_key(), value.display())?;
        }
        map.end()
    }
}

/// Returns the first balanced `{...}` span, honouring JSON string escapes.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Turns an uploaded photo into a [`FeatureSet`] via the vision service.
///
/// No retries here: a failed call surfaces immediately and the caller may
/// offer the manual text fallback.
pub struct FeatureExtractor {
    vision: Arc<dyn VisionService>,
    instruction: String,
    timeout: Duration,
}

impl FeatureExtractor {
    pub fn new(vision: Arc<dyn VisionService>, instruction: impl Into<String>, timeout: Duration) -> Self {
        Self {
            vision,
            instruction: instruction.into(),
            timeout,
        }
    }

    pub async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<FeatureSet, ExtractionError> {
        let photo = PipelineArtifact::new(image.to_vec(), mime_type);
        let call = self.vision.analyze_image(&photo, &self.instruction);
        let text = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => return Err(ExtractionError::EmptyResponse),
            Ok(Err(err)) => return Err(ExtractionError::Upstream(err.to_string())),
            Err(_) => {
                return Err(ExtractionError::Upstream(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse);
        }

        match FeatureSet::from_response_text(&text) {
            Ok(features) => {
                debug!(
                    glasses = features.glasses().unwrap_or(UNKNOWN_SENTINEL),
                    "Extracted feature set"
                );
                Ok(features)
            }
            Err(err) => {
                warn!("Feature extraction parse failed: {err}");
                Err(err)
            }
        }
    }
}
