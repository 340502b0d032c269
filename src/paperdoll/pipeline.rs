use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::paperdoll::features::FeatureSet;
use crate::paperdoll::ports::{ImageGenerator, PipelineArtifact};
use crate::paperdoll::prompt::{
    compose_character_prompt, compose_color_prompt, compose_paperdoll_prompt, GenerationOptions,
    Prompt,
};
use crate::paperdoll::results::{ResultSet, StyleResult};
use crate::paperdoll::styles::{StyleDefinition, StyleRegistry};
use crate::paperdoll::themes::{ThemeDefinition, ThemeRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Character,
    LineArt,
    Color,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Character, Stage::LineArt, Stage::Color];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Character => "character",
            Stage::LineArt => "lineart",
            Stage::Color => "color",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Character => "캐릭터",
            Stage::LineArt => "도안",
            Stage::Color => "컬러",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "character" | "char" => Some(Stage::Character),
            "lineart" | "line-art" | "line_art" | "paperdoll" | "coloring" | "sheet" => {
                Some(Stage::LineArt)
            }
            "color" | "colour" => Some(Stage::Color),
            _ => None,
        }
    }

    /// The stage whose artifact this stage consumes as its reference.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Stage::Character => None,
            Stage::LineArt => Some(Stage::Character),
            Stage::Color => Some(Stage::LineArt),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage outputs the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSet {
    requested: [bool; 3],
}

impl Default for StageSet {
    fn default() -> Self {
        Self::all()
    }
}

impl StageSet {
    pub fn all() -> Self {
        Self {
            requested: [true; 3],
        }
    }

    pub fn none() -> Self {
        Self {
            requested: [false; 3],
        }
    }

    pub fn only(stage: Stage) -> Self {
        let mut set = Self::none();
        set.insert(stage);
        set
    }

    pub fn insert(&mut self, stage: Stage) {
        self.requested[stage.index()] = true;
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.requested[stage.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.requested.iter().any(|flag| *flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(move |stage| self.contains(*stage))
    }

    /// Parses a comma separated list such as `character,lineart`.
    pub fn parse_list(value: &str) -> Result<Self, String> {
        let mut set = Self::none();
        for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match Stage::parse(token) {
                Some(stage) => set.insert(stage),
                None => return Err(token.to_string()),
            }
        }
        if set.is_empty() {
            return Err(value.to_string());
        }
        Ok(set)
    }

    /// Stages that must run so every requested output exists: the last
    /// requested stage and its chain of prerequisites, in execution order.
    pub fn execution_plan(&self) -> Vec<Stage> {
        let Some(last) = self.iter().last() else {
            return Vec::new();
        };
        let mut plan = vec![last];
        let mut current = last;
        while let Some(previous) = current.prerequisite() {
            plan.push(previous);
            current = previous;
        }
        plan.reverse();
        plan
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageFailure {
    #[error("no image returned")]
    NoImageReturned,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Progress of one style's run. Each pending state owns the artifact the
/// next stage needs, so a stage cannot start without its reference.
#[derive(Debug, Clone)]
pub enum StageState {
    PendingCharacter,
    PendingLineArt { character: PipelineArtifact },
    PendingColor { line_art: PipelineArtifact },
    Done,
    Failed { stage: Stage, failure: StageFailure },
}

impl StageState {
    /// The stage to run next and its reference artifact.
    pub fn next_stage(&self) -> Option<(Stage, Option<&PipelineArtifact>)> {
        match self {
            StageState::PendingCharacter => Some((Stage::Character, None)),
            StageState::PendingLineArt { character } => Some((Stage::LineArt, Some(character))),
            StageState::PendingColor { line_art } => Some((Stage::Color, Some(line_art))),
            StageState::Done | StageState::Failed { .. } => None,
        }
    }

    /// Moves past the current stage with its output. `last` is the final
    /// stage of the execution plan.
    pub fn advance(self, artifact: PipelineArtifact, last: Stage) -> StageState {
        match self {
            StageState::PendingCharacter if last > Stage::Character => {
                StageState::PendingLineArt {
                    character: artifact,
                }
            }
            StageState::PendingLineArt { .. } if last > Stage::LineArt => {
                StageState::PendingColor { line_art: artifact }
            }
            StageState::PendingCharacter
            | StageState::PendingLineArt { .. }
            | StageState::PendingColor { .. } => StageState::Done,
            terminal => terminal,
        }
    }

    pub fn fail(self, failure: StageFailure) -> StageState {
        match self.next_stage() {
            Some((stage, _)) => StageState::Failed { stage, failure },
            None => self,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Caller order is kept; unknown ids fall back to the default style.
    pub style_ids: Vec<String>,
    pub theme_id: Option<String>,
    pub outputs: StageSet,
    pub options: GenerationOptions,
}

impl PipelineRequest {
    pub fn new(style_ids: Vec<String>) -> Self {
        Self {
            style_ids,
            theme_id: None,
            outputs: StageSet::all(),
            options: GenerationOptions::default(),
        }
    }
}

/// Published while a run progresses, in execution order.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted {
        style_id: String,
        stage: Stage,
        style_index: usize,
        style_count: usize,
    },
    StageCompleted {
        style_id: String,
        stage: Stage,
        /// False when the stage only ran to feed a later one.
        requested: bool,
        artifact: PipelineArtifact,
    },
    StageFailed {
        style_id: String,
        stage: Stage,
        failure: StageFailure,
    },
    StyleFinished(StyleResult),
}

pub struct Orchestrator {
    generator: Arc<dyn ImageGenerator>,
    styles: Arc<StyleRegistry>,
    themes: Arc<ThemeRegistry>,
    stage_timeout: Duration,
    face_reference: Option<PipelineArtifact>,
}

struct RunContext<'a> {
    features: &'a FeatureSet,
    theme: Option<&'a ThemeDefinition>,
    options: &'a GenerationOptions,
    outputs: StageSet,
    plan: &'a [Stage],
    events: Option<&'a mpsc::Sender<PipelineEvent>>,
}

impl RunContext<'_> {
    fn abandoned(&self) -> bool {
        self.events.map(|tx| tx.is_closed()).unwrap_or(false)
    }

    async fn emit(&self, event: PipelineEvent) -> bool {
        match self.events {
            Some(tx) => tx.send(event).await.is_ok(),
            None => true,
        }
    }
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        styles: Arc<StyleRegistry>,
        themes: Arc<ThemeRegistry>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            styles,
            themes,
            stage_timeout,
            face_reference: None,
        }
    }

    /// Reference image sent with the character stage to anchor face quality.
    pub fn with_face_reference(mut self, face_reference: Option<PipelineArtifact>) -> Self {
        self.face_reference = face_reference;
        self
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn themes(&self) -> &ThemeRegistry {
        &self.themes
    }

    /// Resolves ids to styles, keeping caller order and dropping repeats.
    pub fn resolve_styles(&self, style_ids: &[String]) -> Vec<&StyleDefinition> {
        if style_ids.is_empty() {
            return vec![self.styles.default_style()];
        }
        let mut seen = HashSet::new();
        style_ids
            .iter()
            .map(|id| self.styles.get(id))
            .filter(|style| seen.insert(style.id.clone()))
            .collect()
    }

    /// Runs every selected style sequentially. Stage failures stay inside
    /// their style; a dropped event receiver abandons the run.
    pub async fn run(
        &self,
        features: &FeatureSet,
        request: &PipelineRequest,
        events: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> ResultSet {
        let outputs = if request.outputs.is_empty() {
            warn!("Pipeline request without outputs, running every stage");
            StageSet::all()
        } else {
            request.outputs
        };
        let plan = outputs.execution_plan();
        let theme = self.themes.resolve(request.theme_id.as_deref());
        let styles = self.resolve_styles(&request.style_ids);
        let ctx = RunContext {
            features,
            theme,
            options: &request.options,
            outputs,
            plan: &plan,
            events,
        };

        info!(
            styles = styles.len(),
            theme = theme.map(|t| t.id.as_str()).unwrap_or("none"),
            plan = ?plan,
            "Starting paper-doll pipeline"
        );

        let mut result_set = ResultSet::default();
        let style_count = styles.len();
        for (style_index, style) in styles.into_iter().enumerate() {
            let Some(result) = self.run_style(&ctx, style, style_index, style_count).await else {
                result_set.abandoned = true;
                break;
            };
            result_set.results.push(result.clone());
            if !ctx.emit(PipelineEvent::StyleFinished(result)).await {
                result_set.abandoned = true;
                break;
            }
        }

        if result_set.abandoned {
            info!("Pipeline abandoned by caller; discarding remaining work");
        }
        result_set
    }

    /// Spawns the run on the runtime and returns its progress stream.
    pub fn spawn(
        self: Arc<Self>,
        features: FeatureSet,
        request: PipelineRequest,
        buffer: usize,
    ) -> (mpsc::Receiver<PipelineEvent>, JoinHandle<ResultSet>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle =
            tokio::spawn(async move { self.run(&features, &request, Some(&tx)).await });
        (rx, handle)
    }

    /// Returns `None` when the caller abandoned the run mid-style.
    async fn run_style(
        &self,
        ctx: &RunContext<'_>,
        style: &StyleDefinition,
        style_index: usize,
        style_count: usize,
    ) -> Option<StyleResult> {
        let Some(&last) = ctx.plan.last() else {
            return Some(StyleResult::new(&style.id));
        };
        let mut result = StyleResult::new(&style.id);
        let mut state = StageState::PendingCharacter;

        while let Some((stage, reference)) = state.next_stage() {
            if ctx.abandoned() {
                return None;
            }
            let reference = match stage {
                Stage::Character => self.face_reference.clone(),
                _ => reference.cloned(),
            };
            let prompt = self.compose(ctx, style, stage);
            let sent = ctx
                .emit(PipelineEvent::StageStarted {
                    style_id: style.id.clone(),
                    stage,
                    style_index,
                    style_count,
                })
                .await;
            if !sent {
                return None;
            }

            let outcome = self
                .execute_stage(&style.id, &prompt, reference.as_ref())
                .await;
            if ctx.abandoned() {
                debug!(style = %style.id, stage = %stage, "Discarding stage result of abandoned run");
                return None;
            }

            state = match outcome {
                Ok(artifact) => {
                    let requested = ctx.outputs.contains(stage);
                    if requested {
                        result.record(stage, artifact.clone());
                    }
                    let sent = ctx
                        .emit(PipelineEvent::StageCompleted {
                            style_id: style.id.clone(),
                            stage,
                            requested,
                            artifact: artifact.clone(),
                        })
                        .await;
                    if !sent {
                        return None;
                    }
                    state.advance(artifact, last)
                }
                Err(failure) => {
                    warn!(style = %style.id, stage = %stage, error = %failure, "Stage failed; skipping remaining stages for this style");
                    let sent = ctx
                        .emit(PipelineEvent::StageFailed {
                            style_id: style.id.clone(),
                            stage,
                            failure: failure.clone(),
                        })
                        .await;
                    if !sent {
                        return None;
                    }
                    state.fail(failure)
                }
            };
        }

        if let StageState::Failed { stage, failure } = state {
            result.fail(stage, failure);
        }
        Some(result)
    }

    fn compose(&self, ctx: &RunContext<'_>, style: &StyleDefinition, stage: Stage) -> Prompt {
        match stage {
            Stage::Character => compose_character_prompt(ctx.features, style, ctx.options),
            Stage::LineArt => compose_paperdoll_prompt(style, ctx.theme, ctx.options),
            Stage::Color => compose_color_prompt(style, ctx.theme, ctx.options),
        }
    }

    async fn execute_stage(
        &self,
        style_id: &str,
        prompt: &Prompt,
        reference: Option<&PipelineArtifact>,
    ) -> Result<PipelineArtifact, StageFailure> {
        let stage = prompt.stage();
        let instruction = prompt.render();
        let started = Instant::now();
        let call = self.generator.generate_image(&instruction, reference);
        let outcome = match tokio::time::timeout(self.stage_timeout, call).await {
            Err(_) => Err(StageFailure::Timeout(self.stage_timeout)),
            Ok(Err(err)) => Err(StageFailure::Upstream(err.to_string())),
            Ok(Ok(None)) => Err(StageFailure::NoImageReturned),
            Ok(Ok(Some(artifact))) => Ok(artifact),
        };
        info!(
            style = style_id,
            stage = %stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Stage finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::paperdoll::prompt::{ColorPreset, GLASSES_FORBIDDEN};

    #[derive(Debug, Clone)]
    struct Call {
        instruction: String,
        reference: Option<Vec<u8>>,
    }

    type Script = dyn Fn(&str, usize) -> Result<Option<PipelineArtifact>> + Send + Sync;

    struct ScriptedGenerator {
        calls: Mutex<Vec<Call>>,
        script: Box<Script>,
        delay: Option<Duration>,
    }

    impl ScriptedGenerator {
        fn new(
            script: impl Fn(&str, usize) -> Result<Option<PipelineArtifact>> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                script: Box::new(script),
                delay: None,
            })
        }

        fn always_image() -> Arc<Self> {
            Self::new(|_, n| Ok(Some(image(n))))
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ImageGenerator for ScriptedGenerator {
        async fn generate_image(
            &self,
            instruction: &str,
            reference: Option<&PipelineArtifact>,
        ) -> Result<Option<PipelineArtifact>> {
            let n = {
                let mut calls = self.calls.lock();
                calls.push(Call {
                    instruction: instruction.to_string(),
                    reference: reference.map(|r| r.bytes().to_vec()),
                });
                calls.len()
            };
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.script)(instruction, n)
        }
    }

    fn image(n: usize) -> PipelineArtifact {
        PipelineArtifact::new(format!("img-{n}").into_bytes(), "image/png")
    }

    fn orchestrator(generator: Arc<dyn ImageGenerator>) -> Orchestrator {
        Orchestrator::new(
            generator,
            Arc::new(StyleRegistry::builtin()),
            Arc::new(ThemeRegistry::builtin()),
            Duration::from_secs(5),
        )
    }

    fn example_features() -> FeatureSet {
        FeatureSet::from_json_value(&json!({
            "gender": "여자",
            "age": "7살",
            "hair_style": "긴 갈색 생머리",
            "glasses": "null",
            "summary": "긴 갈색 생머리의 7살 여자아이"
        }))
        .unwrap()
    }

    fn request(styles: &[&str], outputs: StageSet) -> PipelineRequest {
        PipelineRequest {
            outputs,
            ..PipelineRequest::new(styles.iter().map(|s| s.to_string()).collect())
        }
    }

    #[test]
    fn execution_plan_expands_prerequisites() {
        assert_eq!(
            StageSet::only(Stage::Color).execution_plan(),
            vec![Stage::Character, Stage::LineArt, Stage::Color]
        );
        assert_eq!(
            StageSet::only(Stage::LineArt).execution_plan(),
            vec![Stage::Character, Stage::LineArt]
        );
        assert_eq!(
            StageSet::only(Stage::Character).execution_plan(),
            vec![Stage::Character]
        );
        assert!(StageSet::none().execution_plan().is_empty());
    }

    #[test]
    fn stage_list_parsing_accepts_aliases() {
        let set = StageSet::parse_list("character, coloring").unwrap();
        assert!(set.contains(Stage::Character));
        assert!(set.contains(Stage::LineArt));
        assert!(!set.contains(Stage::Color));
        assert_eq!(StageSet::parse_list("color,glitter"), Err("glitter".to_string()));
        assert!(StageSet::parse_list(" , ").is_err());
    }

    #[test]
    fn state_machine_walks_the_plan_and_stops_on_failure() {
        let state = StageState::PendingCharacter.advance(image(1), Stage::Color);
        let (stage, reference) = state.next_stage().unwrap();
        assert_eq!(stage, Stage::LineArt);
        assert_eq!(reference.unwrap().bytes(), b"img-1");

        let state = state.advance(image(2), Stage::Color);
        assert!(matches!(state, StageState::PendingColor { .. }));
        assert!(matches!(state.advance(image(3), Stage::Color), StageState::Done));

        let done = StageState::PendingCharacter.advance(image(1), Stage::Character);
        assert!(matches!(done, StageState::Done));
        assert!(done.next_stage().is_none());

        let failed = StageState::PendingCharacter
            .advance(image(1), Stage::Color)
            .fail(StageFailure::NoImageReturned);
        assert!(matches!(
            failed,
            StageState::Failed {
                stage: Stage::LineArt,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn color_only_runs_all_stages_and_chains_references() {
        let generator = ScriptedGenerator::always_image();
        let orchestrator = orchestrator(generator.clone());

        let results = orchestrator
            .run(
                &example_features(),
                &request(&["simple"], StageSet::only(Stage::Color)),
                None,
            )
            .await;

        let calls = generator.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].instruction.starts_with("Create a single character reference"));
        assert!(calls[0].reference.is_none());
        assert!(calls[1].instruction.starts_with("Create a high-quality paper doll"));
        assert_eq!(calls[1].reference.as_deref(), Some(&b"img-1"[..]));
        assert!(calls[2].instruction.starts_with("Take this exact black-and-white"));
        assert_eq!(calls[2].reference.as_deref(), Some(&b"img-2"[..]));

        let simple = results.get("simple").unwrap();
        assert!(simple.character.is_none());
        assert!(simple.line_art.is_none());
        assert_eq!(simple.color.as_ref().unwrap().bytes(), b"img-3");
        assert!(simple.failure.is_none());
    }

    #[tokio::test]
    async fn character_only_runs_exactly_one_stage() {
        let generator = ScriptedGenerator::always_image();
        let results = orchestrator(generator.clone())
            .run(
                &example_features(),
                &request(&["noir"], StageSet::only(Stage::Character)),
                None,
            )
            .await;
        assert_eq!(generator.calls().len(), 1);
        assert!(results.get("noir").unwrap().character.is_some());
    }

    #[tokio::test]
    async fn face_reference_feeds_the_character_stage() {
        let generator = ScriptedGenerator::always_image();
        let orchestrator = orchestrator(generator.clone()).with_face_reference(Some(
            PipelineArtifact::new(b"face".to_vec(), "image/jpeg"),
        ));
        orchestrator
            .run(
                &example_features(),
                &request(&["simple"], StageSet::only(Stage::LineArt)),
                None,
            )
            .await;
        let calls = generator.calls();
        assert_eq!(calls[0].reference.as_deref(), Some(&b"face"[..]));
        assert_eq!(calls[1].reference.as_deref(), Some(&b"img-1"[..]));
    }

    #[tokio::test]
    async fn failure_in_one_style_does_not_stop_the_next() {
        let pastel_tone = StyleRegistry::builtin().get("pastel").tone.clone();
        let generator = ScriptedGenerator::new(move |instruction, n| {
            let is_sheet = instruction.starts_with("Create a high-quality paper doll");
            if is_sheet && instruction.contains(&pastel_tone) {
                Ok(None)
            } else {
                Ok(Some(image(n)))
            }
        });
        let results = orchestrator(generator.clone())
            .run(
                &example_features(),
                &request(&["simple", "pastel"], StageSet::all()),
                None,
            )
            .await;

        assert_eq!(generator.calls().len(), 5);
        let ids: Vec<&str> = results.results.iter().map(|r| r.style_id.as_str()).collect();
        assert_eq!(ids, vec!["simple", "pastel"]);

        let simple = results.get("simple").unwrap();
        assert!(simple.character.is_some() && simple.line_art.is_some() && simple.color.is_some());
        assert!(simple.failure.is_none());

        let pastel = results.get("pastel").unwrap();
        assert!(pastel.character.is_some());
        assert!(pastel.line_art.is_none() && pastel.color.is_none());
        assert_eq!(
            pastel.failure,
            Some((Stage::LineArt, StageFailure::NoImageReturned))
        );
        assert!(!results.abandoned);
    }

    #[tokio::test]
    async fn upstream_errors_and_timeouts_are_stage_failures() {
        let failing = ScriptedGenerator::new(|_, _| Err(anyhow!("HTTP 500")));
        let results = orchestrator(failing)
            .run(&example_features(), &request(&["sd"], StageSet::all()), None)
            .await;
        assert!(matches!(
            results.get("sd").unwrap().failure,
            Some((Stage::Character, StageFailure::Upstream(_)))
        ));

        let slow = Arc::new(ScriptedGenerator {
            calls: Mutex::new(Vec::new()),
            script: Box::new(|_, n| Ok(Some(image(n)))),
            delay: Some(Duration::from_secs(5)),
        });
        let orchestrator = Orchestrator::new(
            slow.clone(),
            Arc::new(StyleRegistry::builtin()),
            Arc::new(ThemeRegistry::builtin()),
            Duration::from_millis(20),
        );
        let results = orchestrator
            .run(&example_features(), &request(&["sd", "noir"], StageSet::all()), None)
            .await;
        assert_eq!(slow.calls().len(), 2);
        for result in &results.results {
            assert_eq!(
                result.failure,
                Some((Stage::Character, StageFailure::Timeout(Duration::from_millis(20))))
            );
        }
    }

    #[tokio::test]
    async fn unknown_and_repeated_styles_resolve_once_in_order() {
        let generator = ScriptedGenerator::always_image();
        let results = orchestrator(generator.clone())
            .run(
                &example_features(),
                &request(&["noir", "bogus", "simple", "NOIR"], StageSet::only(Stage::Character)),
                None,
            )
            .await;
        let ids: Vec<&str> = results.results.iter().map(|r| r.style_id.as_str()).collect();
        assert_eq!(ids, vec!["noir", "simple"]);
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn events_arrive_in_style_and_stage_order() {
        let generator = ScriptedGenerator::always_image();
        let orchestrator = Arc::new(orchestrator(generator));
        let (mut rx, handle) = orchestrator.spawn(
            example_features(),
            request(&["sd", "simple"], StageSet::only(Stage::LineArt)),
            4,
        );

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::StageCompleted {
                    style_id,
                    stage,
                    requested,
                    ..
                } => seen.push(format!("{style_id}:{stage}:{requested}")),
                PipelineEvent::StyleFinished(result) => seen.push(format!("{}:done", result.style_id)),
                _ => {}
            }
        }
        assert_eq!(
            seen,
            vec![
                "sd:character:false",
                "sd:lineart:true",
                "sd:done",
                "simple:character:false",
                "simple:lineart:true",
                "simple:done",
            ]
        );
        let results = handle.await.unwrap();
        assert_eq!(results.results.len(), 2);
    }

    #[tokio::test]
    async fn dropped_receiver_abandons_the_run() {
        let generator = ScriptedGenerator::always_image();
        let orchestrator = orchestrator(generator.clone());
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let results = orchestrator
            .run(&example_features(), &request(&["simple"], StageSet::all()), Some(&tx))
            .await;
        assert!(results.abandoned);
        assert!(results.results.is_empty());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn receiver_dropped_mid_stage_discards_the_in_flight_result() {
        let slow = Arc::new(ScriptedGenerator {
            calls: Mutex::new(Vec::new()),
            script: Box::new(|_, n| Ok(Some(image(n)))),
            delay: Some(Duration::from_millis(100)),
        });
        let orchestrator = Arc::new(orchestrator(slow.clone()));
        let (mut rx, handle) = orchestrator.spawn(
            example_features(),
            request(&["simple", "sd"], StageSet::all()),
            8,
        );

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            PipelineEvent::StageStarted {
                stage: Stage::Character,
                ..
            }
        ));
        drop(rx);

        let results = handle.await.unwrap();
        assert!(results.abandoned);
        assert!(results.results.is_empty());
        assert_eq!(slow.calls().len(), 1);
    }

    #[tokio::test]
    async fn end_to_end_coloring_sheet_forbids_glasses_and_ends_monochrome() {
        let generator = ScriptedGenerator::always_image();
        let mut req = request(&["simple"], StageSet::all());
        req.options = GenerationOptions {
            line_art_only: true,
            color_preset: ColorPreset::Balanced,
            ..GenerationOptions::default()
        };
        let results = orchestrator(generator.clone())
            .run(&example_features(), &req, None)
            .await;

        let calls = generator.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].instruction.contains(GLASSES_FORBIDDEN));

        let sheet = &calls[1].instruction;
        assert!(sheet.contains(GLASSES_FORBIDDEN));
        let override_at = sheet.find("RENDERING MODE: COLORING BOOK").unwrap();
        let tail = &sheet[override_at..];
        assert!(tail.contains("ZERO color fills"));
        assert!(!tail.contains("flat color"));
        assert!(sheet[..override_at].contains("clean flat color"));

        assert!(calls[2].instruction.contains(ColorPreset::Balanced.modifier()));
        let simple = results.get("simple").unwrap();
        assert!(simple.character.is_some() && simple.line_art.is_some() && simple.color.is_some());
    }
}
