use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::paperdoll::pipeline::{Stage, StageFailure};
use crate::paperdoll::ports::{
    ArtifactKey, ArtifactStore, GenerationRecord, HistoryStore, PipelineArtifact,
};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceFailure {
    #[error("artifact upload failed: {0}")]
    Artifact(String),
    #[error("history write failed: {0}")]
    History(String),
}

/// Artifacts kept for one style. Only requested stages are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleResult {
    pub style_id: String,
    pub character: Option<PipelineArtifact>,
    pub line_art: Option<PipelineArtifact>,
    pub color: Option<PipelineArtifact>,
    pub failure: Option<(Stage, StageFailure)>,
}

impl StyleResult {
    pub fn new(style_id: &str) -> Self {
        Self {
            style_id: style_id.to_string(),
            character: None,
            line_art: None,
            color: None,
            failure: None,
        }
    }

    pub fn record(&mut self, stage: Stage, artifact: PipelineArtifact) {
        let slot = match stage {
            Stage::Character => &mut self.character,
            Stage::LineArt => &mut self.line_art,
            Stage::Color => &mut self.color,
        };
        *slot = Some(artifact);
    }

    pub fn fail(&mut self, stage: Stage, failure: StageFailure) {
        self.failure = Some((stage, failure));
    }

    pub fn artifact(&self, stage: Stage) -> Option<&PipelineArtifact> {
        match stage {
            Stage::Character => self.character.as_ref(),
            Stage::LineArt => self.line_art.as_ref(),
            Stage::Color => self.color.as_ref(),
        }
    }

    pub fn artifacts(&self) -> impl Iterator<Item = (Stage, &PipelineArtifact)> {
        Stage::ALL
            .into_iter()
            .filter_map(move |stage| self.artifact(stage).map(|artifact| (stage, artifact)))
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// In the order the styles ran.
    pub results: Vec<StyleResult>,
    /// The caller stopped listening before the run finished.
    pub abandoned: bool,
}

impl ResultSet {
    pub fn get(&self, style_id: &str) -> Option<&StyleResult> {
        self.results.iter().find(|result| result.style_id == style_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StyleResult> {
        self.results.iter().filter(|result| result.is_failed())
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|result| !result.is_failed()).count()
    }
}

/// Best-effort persistence of finished runs.
#[derive(Clone)]
pub struct HistoryRecorder {
    artifacts: Arc<dyn ArtifactStore>,
    history: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { artifacts, history }
    }

    /// Uploads the artifacts and writes one history row per style on a
    /// detached task. Failures are logged and never reach the caller.
    pub fn spawn_record(
        &self,
        owner: String,
        features_summary: String,
        results: ResultSet,
    ) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            if let Err(err) = recorder.record(&owner, &features_summary, &results).await {
                warn!(owner = %owner, "Failed to record generation history: {}", err);
            }
        })
    }

    async fn record(
        &self,
        owner: &str,
        features_summary: &str,
        results: &ResultSet,
    ) -> Result<(), PersistenceFailure> {
        if results.abandoned {
            info!(owner = %owner, "Skipping history for abandoned run");
            return Ok(());
        }
        let created_at = Utc::now();
        let timestamp = created_at.timestamp_millis();
        let mut records = Vec::new();

        for result in &results.results {
            let mut urls: [Option<String>; 3] = [None, None, None];
            for (stage, artifact) in result.artifacts() {
                let key = ArtifactKey {
                    owner: owner.to_string(),
                    timestamp,
                    style_id: result.style_id.clone(),
                    stage,
                };
                match self.artifacts.put_artifact(&key, artifact).await {
                    Ok(url) => urls[stage as usize] = Some(url),
                    Err(err) => {
                        let failure = PersistenceFailure::Artifact(format!(
                            "{}: {}",
                            key.object_path(artifact.file_extension()),
                            err
                        ));
                        warn!(style = %result.style_id, stage = %stage, "{}", failure);
                    }
                }
            }
            let [character_url, line_art_url, color_url] = urls;
            let line_art_url = line_art_url.or(character_url);
            if line_art_url.is_none() && color_url.is_none() {
                continue;
            }
            records.push(GenerationRecord {
                owner: owner.to_string(),
                features_summary: features_summary.to_string(),
                style_id: result.style_id.clone(),
                line_art_url,
                color_url,
                created_at,
            });
        }

        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        self.history
            .record_generations(records)
            .await
            .map_err(|err| PersistenceFailure::History(err.to_string()))?;
        info!(owner = %owner, records = count, "Recorded generation history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        fail_stage: Option<Stage>,
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactStore for MemoryStore {
        async fn put_artifact(&self, key: &ArtifactKey, artifact: &PipelineArtifact) -> Result<String> {
            if Some(key.stage) == self.fail_stage {
                return Err(anyhow!("bucket unavailable"));
            }
            let path = key.object_path(artifact.file_extension());
            self.paths.lock().push(path.clone());
            Ok(format!("https://cdn.test/{path}"))
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        fail: bool,
        rows: Mutex<Vec<GenerationRecord>>,
    }

    #[async_trait]
    impl HistoryStore for MemoryHistory {
        async fn record_generations(&self, records: Vec<GenerationRecord>) -> Result<()> {
            if self.fail {
                return Err(anyhow!("database is locked"));
            }
            self.rows.lock().extend(records);
            Ok(())
        }
    }

    fn png(tag: &str) -> PipelineArtifact {
        PipelineArtifact::new(tag.as_bytes().to_vec(), "image/png")
    }

    fn sample_results() -> ResultSet {
        let mut full = StyleResult::new("simple");
        full.record(Stage::Character, png("c"));
        full.record(Stage::LineArt, png("l"));
        full.record(Stage::Color, png("k"));

        let mut partial = StyleResult::new("pastel");
        partial.record(Stage::Character, png("c2"));
        partial.fail(Stage::LineArt, StageFailure::NoImageReturned);

        let mut empty = StyleResult::new("noir");
        empty.fail(Stage::Character, StageFailure::Timeout(std::time::Duration::from_secs(60)));

        ResultSet {
            results: vec![full, partial, empty],
            abandoned: false,
        }
    }

    #[tokio::test]
    async fn records_one_row_per_style_with_artifacts() {
        let store = Arc::new(MemoryStore::default());
        let history = Arc::new(MemoryHistory::default());
        let recorder = HistoryRecorder::new(store.clone(), history.clone());

        recorder
            .spawn_record("42".to_string(), "7살 여자아이".to_string(), sample_results())
            .await
            .unwrap();

        let paths = store.paths.lock().clone();
        assert_eq!(paths.len(), 4);
        assert!(paths[0].starts_with("42/") && paths[0].ends_with("-simple-character.png"));
        assert!(paths.iter().any(|p| p.ends_with("-simple-lineart.png")));

        let rows = history.rows.lock().clone();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].style_id, "simple");
        assert!(rows[0].line_art_url.as_deref().unwrap().ends_with("-simple-lineart.png"));
        assert!(rows[0].color_url.as_deref().unwrap().ends_with("-simple-color.png"));
        assert_eq!(rows[1].style_id, "pastel");
        assert!(rows[1].line_art_url.as_deref().unwrap().ends_with("-pastel-character.png"));
        assert!(rows[1].color_url.is_none());
        assert_eq!(rows[0].features_summary, "7살 여자아이");
    }

    #[tokio::test]
    async fn upload_and_history_failures_are_swallowed() {
        let store = Arc::new(MemoryStore {
            fail_stage: Some(Stage::Color),
            ..MemoryStore::default()
        });
        let history = Arc::new(MemoryHistory {
            fail: true,
            ..MemoryHistory::default()
        });
        let recorder = HistoryRecorder::new(store.clone(), history.clone());
        let results = sample_results();

        let outcome = recorder
            .spawn_record("7".to_string(), "summary".to_string(), results.clone())
            .await;
        assert!(outcome.is_ok());
        assert!(history.rows.lock().is_empty());
        assert_eq!(store.paths.lock().len(), 3);
        assert_eq!(results.succeeded_count(), 1);
    }

    #[tokio::test]
    async fn abandoned_runs_are_not_recorded() {
        let store = Arc::new(MemoryStore::default());
        let history = Arc::new(MemoryHistory::default());
        let recorder = HistoryRecorder::new(store.clone(), history.clone());
        let mut results = sample_results();
        results.abandoned = true;

        recorder
            .spawn_record("1".to_string(), "s".to_string(), results)
            .await
            .unwrap();
        assert!(store.paths.lock().is_empty());
        assert!(history.rows.lock().is_empty());
    }

    #[test]
    fn failed_styles_are_listed() {
        let results = sample_results();
        let failed: Vec<&str> = results.failed().map(|r| r.style_id.as_str()).collect();
        assert_eq!(failed, vec!["pastel", "noir"]);
        assert_eq!(results.get("simple").unwrap().artifacts().count(), 3);
    }
}
