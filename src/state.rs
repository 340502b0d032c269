use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{Config, FEATURE_EXTRACTION_PROMPT};
use crate::db::database::Database;
use crate::llm::gemini::GeminiClient;
use crate::llm::media::reference_from_bytes;
use crate::paperdoll::features::{FeatureExtractor, FeatureSet};
use crate::paperdoll::pipeline::Orchestrator;
use crate::paperdoll::ports::PipelineArtifact;
use crate::paperdoll::results::HistoryRecorder;
use crate::paperdoll::styles::StyleRegistry;
use crate::paperdoll::themes::ThemeRegistry;

/// The generation core wired to Gemini, shared by the bot and the CLI.
pub struct Engine {
    pub extractor: Arc<FeatureExtractor>,
    pub orchestrator: Arc<Orchestrator>,
}

fn load_face_reference(path: &Path) -> Option<PipelineArtifact> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let reference = reference_from_bytes(bytes, "image/jpeg");
            match &reference {
                Some(image) => info!(
                    "Loaded face reference image {} ({})",
                    path.display(),
                    image.mime_type()
                ),
                None => warn!("Face reference {} is empty or unreadable", path.display()),
            }
            reference
        }
        Err(err) => {
            warn!("Face reference {} not loaded: {}", path.display(), err);
            None
        }
    }
}

impl Engine {
    pub fn from_config(config: &Config) -> Result<Self> {
        let styles = Arc::new(StyleRegistry::load(
            config.style_catalog_path.as_deref(),
            &config.default_style,
        )?);
        let themes = Arc::new(ThemeRegistry::load(config.theme_catalog_path.as_deref())?);
        info!(
            styles = styles.list().len(),
            themes = themes.list().len(),
            default_style = %styles.default_style().id,
            "Catalogs loaded"
        );

        let gemini = Arc::new(GeminiClient::from_config(config)?);
        let extractor = FeatureExtractor::new(
            gemini.clone(),
            FEATURE_EXTRACTION_PROMPT,
            Duration::from_secs(config.analyze_timeout_seconds),
        );
        let orchestrator = Orchestrator::new(
            gemini,
            styles,
            themes,
            Duration::from_secs(config.stage_timeout_seconds),
        )
        .with_face_reference(load_face_reference(&config.face_reference_path));

        Ok(Engine {
            extractor: Arc::new(extractor),
            orchestrator: Arc::new(orchestrator),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub extractor: Arc<FeatureExtractor>,
    pub orchestrator: Arc<Orchestrator>,
    pub recorder: HistoryRecorder,
    /// Last feature set per user from /analyze or /describe.
    pub cached_features: Arc<Mutex<HashMap<i64, FeatureSet>>>,
}

impl AppState {
    pub fn new(db: Database, engine: Engine, recorder: HistoryRecorder) -> Self {
        AppState {
            db,
            extractor: engine.extractor,
            orchestrator: engine.orchestrator,
            recorder,
            cached_features: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache_features(&self, user_id: i64, features: FeatureSet) {
        self.cached_features.lock().insert(user_id, features);
    }

    pub fn cached_features(&self, user_id: i64) -> Option<FeatureSet> {
        self.cached_features.lock().get(&user_id).cloned()
    }
}
