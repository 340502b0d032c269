//! Collaborator seams used by the generation core.
//!
//! The Gemini client, the local artifact store and the SQLite history table
//! implement these traits; tests substitute scripted fakes.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::paperdoll::pipeline::Stage;

/// An encoded image payload plus its MIME type.
///
/// Cloning is cheap: the bytes are shared, so a stage's output can be handed
/// to the next stage as a reference and still be kept in the result set.
#[derive(Clone, PartialEq, Eq)]
pub struct PipelineArtifact {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl PipelineArtifact {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

impl fmt::Debug for PipelineArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineArtifact")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Vision-capable text generation: one image plus an instruction in, free text out.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Returns `Ok(None)` when the service answered without any text part.
    async fn analyze_image(
        &self,
        image: &PipelineArtifact,
        instruction: &str,
    ) -> Result<Option<String>>;
}

/// Image generation with an optional reference image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns `Ok(None)` when the response contained no image part.
    async fn generate_image(
        &self,
        instruction: &str,
        reference: Option<&PipelineArtifact>,
    ) -> Result<Option<PipelineArtifact>>;
}

/// Storage key of one persisted stage output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub owner: String,
    pub timestamp: i64,
    pub style_id: String,
    pub stage: Stage,
}

impl ArtifactKey {
    /// Relative object path, e.g. `42/1718000000000-simple-lineart.png`.
    pub fn object_path(&self, extension: &str) -> String {
        format!(
            "{}/{}-{}-{}.{}",
            self.owner,
            self.timestamp,
            self.style_id,
            self.stage.as_str(),
            extension
        )
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persists the artifact and returns a retrievable URL.
    async fn put_artifact(&self, key: &ArtifactKey, artifact: &PipelineArtifact) -> Result<String>;
}

/// One history row: what was generated for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRecord {
    pub owner: String,
    pub features_summary: String,
    pub style_id: String,
    pub line_art_url: Option<String>,
    pub color_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_generations(&self, records: Vec<GenerationRecord>) -> Result<()>;
}
