use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::handlers::doll_args::parse_style_list;
use crate::llm::media::{downscale_photo, reference_from_bytes};
use crate::paperdoll::features::FeatureSet;
use crate::paperdoll::pipeline::{PipelineRequest, StageSet};
use crate::paperdoll::prompt::ColorPreset;
use crate::paperdoll::results::ResultSet;
use crate::state::Engine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureInput {
    Photo(PathBuf),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub input: FeatureInput,
    pub request: PipelineRequest,
    pub out_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct GenerateSummary {
    pub styles: usize,
    pub failed_styles: usize,
    pub files_written: Vec<PathBuf>,
}

pub fn generate_usage() -> &'static str {
    "Usage: paperdoll_bot generate (--photo <path> | --features-text <text>) --out <dir> [--styles a,b] [--theme <id>] [--outputs character,lineart,color] [--line-art|--color-base] [--ratio <text>] [--preset soft|balanced|bold] [--extra <text>]"
}

fn next_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

/// Returns `Ok(None)` unless the first argument is `generate`.
pub fn parse_generate_args(args: &[String], max_styles: usize) -> Result<Option<GenerateArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("generate") {
        return Ok(None);
    }

    let mut photo: Option<PathBuf> = None;
    let mut features_text: Option<String> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut request = PipelineRequest::new(Vec::new());

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--photo" => {
                photo = Some(PathBuf::from(next_value(args, &mut index, "--photo")?));
            }
            "--features-text" => {
                features_text = Some(next_value(args, &mut index, "--features-text")?.to_string());
            }
            "--out" => {
                out_dir = Some(PathBuf::from(next_value(args, &mut index, "--out")?));
            }
            "--styles" => {
                let mut ids = parse_style_list(next_value(args, &mut index, "--styles")?);
                if ids.len() > max_styles {
                    warn!("Only the first {} styles are generated", max_styles);
                    ids.truncate(max_styles);
                }
                request.style_ids = ids;
            }
            "--theme" => {
                request.theme_id = Some(next_value(args, &mut index, "--theme")?.to_lowercase());
            }
            "--outputs" => {
                let value = next_value(args, &mut index, "--outputs")?;
                request.outputs = StageSet::parse_list(value)
                    .map_err(|token| anyhow!("Invalid --outputs value: {token}"))?;
            }
            "--line-art" => {
                request.options.line_art_only = true;
            }
            "--color-base" => {
                request.options.line_art_only = false;
            }
            "--ratio" => {
                request.options.ratio_override =
                    Some(next_value(args, &mut index, "--ratio")?.to_string());
            }
            "--preset" => {
                request.options.color_preset =
                    ColorPreset::parse_or_default(next_value(args, &mut index, "--preset")?);
            }
            "--extra" => {
                request.options.extra_detail =
                    Some(next_value(args, &mut index, "--extra")?.to_string());
            }
            "--help" | "-h" => {
                return Err(anyhow!(generate_usage()));
            }
            other => {
                return Err(anyhow!(
                    "Unknown generate argument: {other}\n{}",
                    generate_usage()
                ));
            }
        }
        index += 1;
    }

    let input = match (photo, features_text) {
        (Some(path), None) => FeatureInput::Photo(path),
        (None, Some(text)) if !text.trim().is_empty() => FeatureInput::Text(text),
        (Some(_), Some(_)) => {
            return Err(anyhow!("--photo and --features-text are mutually exclusive"))
        }
        _ => return Err(anyhow!("--photo or --features-text is required")),
    };
    let out_dir = out_dir.ok_or_else(|| anyhow!("--out is required"))?;

    Ok(Some(GenerateArgs {
        input,
        request,
        out_dir,
    }))
}

async fn load_features(engine: &Engine, input: &FeatureInput, max_edge: u32) -> Result<FeatureSet> {
    match input {
        FeatureInput::Text(text) => Ok(FeatureSet::from_manual_text(text)),
        FeatureInput::Photo(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("read photo {}", path.display()))?;
            let photo = reference_from_bytes(bytes, "image/jpeg")
                .ok_or_else(|| anyhow!("Photo {} is empty or not decodable", path.display()))?;
            let photo = downscale_photo(photo, max_edge)?;
            let features = engine
                .extractor
                .extract(photo.bytes(), photo.mime_type())
                .await?;
            Ok(features)
        }
    }
}

async fn write_outputs(
    out_dir: &Path,
    features: &FeatureSet,
    results: &ResultSet,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("create {}", out_dir.display()))?;

    let mut written = Vec::new();
    let features_path = out_dir.join("features.json");
    tokio::fs::write(&features_path, serde_json::to_string_pretty(features)?).await?;
    written.push(features_path);

    for result in &results.results {
        for (stage, artifact) in result.artifacts() {
            let path = out_dir.join(format!(
                "{}-{}.{}",
                result.style_id,
                stage.as_str(),
                artifact.file_extension()
            ));
            tokio::fs::write(&path, artifact.bytes())
                .await
                .with_context(|| format!("write {}", path.display()))?;
            written.push(path);
        }
        if let Some((stage, failure)) = &result.failure {
            warn!(style = %result.style_id, stage = %stage, "Style failed: {failure}");
        }
    }
    Ok(written)
}

/// Runs extraction and the pipeline locally; nothing is recorded in history.
pub async fn run_generate(config: &Config, args: GenerateArgs) -> Result<GenerateSummary> {
    let engine = Engine::from_config(config)?;
    let features = load_features(&engine, &args.input, config.max_photo_edge).await?;
    info!("Features: {}", features.summary_text());

    let results = engine
        .orchestrator
        .run(&features, &args.request, None)
        .await;
    let files_written = write_outputs(&args.out_dir, &features, &results).await?;

    Ok(GenerateSummary {
        styles: results.results.len(),
        failed_styles: results.failed().count(),
        files_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paperdoll::pipeline::{Stage, StageFailure};
    use crate::paperdoll::ports::PipelineArtifact;
    use crate::paperdoll::results::StyleResult;

    fn argv(items: &[&str]) -> Vec<String> {
        std::iter::once("paperdoll_bot")
            .chain(items.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn other_subcommands_are_ignored() {
        assert!(parse_generate_args(&argv(&[]), 4).unwrap().is_none());
        assert!(parse_generate_args(&argv(&["serve"]), 4).unwrap().is_none());
    }

    #[test]
    fn parses_full_invocation() {
        let args = parse_generate_args(
            &argv(&[
                "generate",
                "--photo",
                "me.jpg",
                "--styles",
                "sd,noir",
                "--theme",
                "Hanbok",
                "--outputs",
                "character,lineart",
                "--color-base",
                "--ratio",
                "4-head-tall",
                "--preset",
                "soft",
                "--extra",
                "큰 리본",
                "--out",
                "out",
            ]),
            4,
        )
        .unwrap()
        .unwrap();

        assert_eq!(args.input, FeatureInput::Photo(PathBuf::from("me.jpg")));
        assert_eq!(args.out_dir, PathBuf::from("out"));
        let request = args.request;
        assert_eq!(request.style_ids, vec!["sd", "noir"]);
        assert_eq!(request.theme_id.as_deref(), Some("hanbok"));
        assert!(!request.outputs.contains(Stage::Color));
        assert!(!request.options.line_art_only);
        assert_eq!(request.options.ratio_override.as_deref(), Some("4-head-tall"));
        assert_eq!(request.options.color_preset, ColorPreset::Soft);
        assert_eq!(request.options.extra_detail.as_deref(), Some("큰 리본"));
    }

    #[test]
    fn requires_one_input_and_out_dir() {
        let err = parse_generate_args(&argv(&["generate", "--out", "o"]), 4).unwrap_err();
        assert!(err.to_string().contains("required"));

        let err = parse_generate_args(
            &argv(&["generate", "--photo", "a", "--features-text", "b", "--out", "o"]),
            4,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));

        let err =
            parse_generate_args(&argv(&["generate", "--features-text", "x"]), 4).unwrap_err();
        assert!(err.to_string().contains("--out"));

        let err = parse_generate_args(&argv(&["generate", "--styles"]), 4).unwrap_err();
        assert!(err.to_string().contains("Missing value"));
    }

    #[test]
    fn style_list_is_capped() {
        let args = parse_generate_args(
            &argv(&["generate", "--features-text", "x", "--styles", "a,b,c", "--out", "o"]),
            2,
        )
        .unwrap()
        .unwrap();
        assert_eq!(args.request.style_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn writes_features_and_artifacts() {
        let out_dir = std::env::temp_dir().join(format!(
            "paperdoll-cli-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let features = FeatureSet::from_manual_text("단발머리 여자아이");
        let mut simple = StyleResult::new("simple");
        simple.record(Stage::LineArt, PipelineArtifact::new(vec![1u8, 2], "image/png"));
        let mut noir = StyleResult::new("noir");
        noir.fail(Stage::Character, StageFailure::NoImageReturned);
        let results = ResultSet {
            results: vec![simple, noir],
            abandoned: false,
        };

        let written = write_outputs(&out_dir, &features, &results).await.unwrap();
        assert_eq!(
            written,
            vec![
                out_dir.join("features.json"),
                out_dir.join("simple-lineart.png")
            ]
        );
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out_dir.join("features.json")).unwrap())
                .unwrap();
        assert_eq!(json["summary"], "단발머리 여자아이");

        std::fs::remove_dir_all(out_dir).ok();
    }
}
