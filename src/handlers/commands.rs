use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId};
use tracing::{error, info, warn};

use crate::config::{CONFIG, HELP_TEXT};
use crate::db::models::GenerationRow;
use crate::handlers::access::{caller_id, check_access_control, is_rate_limited};
use crate::handlers::doll_args::parse_doll_args;
use crate::handlers::media::{collect_photo, has_photo};
use crate::llm::media::downscale_photo;
use crate::paperdoll::features::FeatureSet;
use crate::paperdoll::pipeline::{PipelineEvent, PipelineRequest, Stage};
use crate::paperdoll::results::{ResultSet, StyleResult};
use crate::paperdoll::styles::StyleRegistry;
use crate::paperdoll::themes::ThemeRegistry;
use crate::state::AppState;
use crate::utils::telegram::{
    edit_status, send_document_with_retry, send_message_with_retry, send_photo_with_retry,
    start_chat_action_heartbeat,
};
use crate::utils::timing::{complete_command_timer, start_command_timer};

const PIPELINE_EVENT_BUFFER: usize = 8;
const HISTORY_SUMMARY_CHARS: usize = 60;

/// Whether a `/doll`-style run writes artifacts and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Persist,
    Demo,
}

impl RunMode {
    fn command(self) -> &'static str {
        match self {
            RunMode::Persist => "doll",
            RunMode::Demo => "demo",
        }
    }
}

async fn reply(bot: &Bot, message: &Message, text: &str) -> Result<Message> {
    send_message_with_retry(bot, message.chat.id, text, Some(message.id)).await
}

fn clip(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let clipped: String = value.chars().take(max_chars).collect();
    format!("{clipped}…")
}

fn style_name<'a>(styles: &'a StyleRegistry, style_id: &'a str) -> &'a str {
    styles
        .lookup(style_id)
        .map(|style| style.name.as_str())
        .unwrap_or(style_id)
}

pub fn format_style_list(styles: &StyleRegistry) -> String {
    let default_id = styles.default_style().id.as_str();
    let mut text = String::from("사용 가능한 스타일 (styles=id1,id2):\n");
    for style in styles.list() {
        let marker = if style.id == default_id { " (기본)" } else { "" };
        let _ = write!(
            text,
            "\n• {}: {}{}\n  비율: {}\n  {}",
            style.id, style.name, marker, style.ratio_display, style.desc_kr
        );
    }
    text
}

pub fn format_theme_list(themes: &ThemeRegistry) -> String {
    let mut text = String::from("사용 가능한 테마 (theme=id):\n");
    for theme in themes.list() {
        let outfits = theme
            .outfits
            .iter()
            .map(|outfit| outfit.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(text, "\n• {}: {}\n  의상: {}", theme.id, theme.name, outfits);
    }
    text
}

pub fn format_history(title: &str, rows: &[GenerationRow], show_owner: bool) -> String {
    if rows.is_empty() {
        return format!("{title}\n\n아직 기록이 없어요.");
    }
    let mut text = format!("{title}\n");
    for row in rows {
        let _ = write!(
            text,
            "\n{} · {}",
            row.created_at.format("%Y-%m-%d %H:%M"),
            row.style_id
        );
        if show_owner {
            // Gallery entries stay compact: one preview link per row.
            let _ = write!(text, " · #{}", row.owner);
            if let Some(url) = row.preview_url() {
                let _ = write!(text, "\n  {url}");
            }
            continue;
        }
        if !row.features_summary.trim().is_empty() {
            let _ = write!(text, "\n  {}", clip(&row.features_summary, HISTORY_SUMMARY_CHARS));
        }
        if let Some(url) = &row.line_art_url {
            let _ = write!(text, "\n  도안: {url}");
        }
        if let Some(url) = &row.color_url {
            let _ = write!(text, "\n  컬러: {url}");
        }
    }
    text
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

async fn build_status_report(state: &AppState) -> String {
    let db_result = state.db.health_check().await;
    let db_status = if db_result.is_ok() { "ok" } else { "error" };
    let styles = state.orchestrator.styles();

    let mut report = String::from("Status snapshot\n");
    let _ = writeln!(report, "time_utc: {}", Utc::now().to_rfc3339());
    let _ = writeln!(report, "db: {db_status}");
    if let Err(err) = db_result {
        let _ = writeln!(report, "db_error: {err}");
    }
    let _ = writeln!(report, "db_queue: pending={}", state.db.queue_len());
    let _ = writeln!(
        report,
        "gemini_configured: {}",
        bool_label(!CONFIG.gemini_api_key.trim().is_empty())
    );
    let _ = writeln!(report, "vision_model: {}", CONFIG.gemini_vision_model);
    let _ = writeln!(report, "image_model: {}", CONFIG.gemini_image_model);
    let _ = writeln!(
        report,
        "styles: {} (default {})",
        styles.list().len(),
        styles.default_style().id
    );
    let _ = writeln!(report, "themes: {}", state.orchestrator.themes().list().len());
    let _ = writeln!(
        report,
        "cached_feature_sets: {}",
        state.cached_features.lock().len()
    );
    let _ = writeln!(
        report,
        "whitelist_file: {}",
        bool_label(Path::new(&CONFIG.whitelist_file_path).exists())
    );
    let _ = write!(report, "artifact_dir: {}", CONFIG.artifact_dir.display());
    report
}

fn progress_text(style: &str, stage: Stage, style_index: usize, style_count: usize) -> String {
    format!(
        "[{}/{}] {} · {} 생성 중…",
        style_index + 1,
        style_count,
        style,
        stage.display_name()
    )
}

fn has_artifacts(results: &ResultSet) -> bool {
    results
        .results
        .iter()
        .any(|result| result.artifacts().next().is_some())
}

fn completion_text(results: &ResultSet, mode: RunMode) -> String {
    let total = results.results.len();
    let succeeded = results.succeeded_count();
    let suffix = match mode {
        RunMode::Persist if has_artifacts(results) => " 기록에 저장했어요 (/history).",
        RunMode::Persist => "",
        RunMode::Demo => " 데모 실행이라 저장하지 않았어요.",
    };
    format!("완료: {succeeded}/{total} 스타일 성공.{suffix}")
}

/// Notes for ids the registries will silently replace.
fn unknown_id_notes(state: &AppState, request: &PipelineRequest) -> Vec<String> {
    let styles = state.orchestrator.styles();
    let mut notes: Vec<String> = request
        .style_ids
        .iter()
        .filter(|id| styles.lookup(id).is_none())
        .map(|id| {
            format!(
                "알 수 없는 스타일 '{}' → 기본 스타일({})로 대체해요.",
                id,
                styles.default_style().id
            )
        })
        .collect();
    if let Some(theme_id) = request.theme_id.as_deref() {
        if state.orchestrator.themes().get(theme_id).is_none() {
            notes.push(format!("알 수 없는 테마 '{theme_id}' → 테마 없이 진행해요."));
        }
    }
    notes
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    reply(&bot, &message, HELP_TEXT).await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    reply(&bot, &message, HELP_TEXT).await?;
    Ok(())
}

pub async fn styles_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    reply(&bot, &message, &format_style_list(state.orchestrator.styles())).await?;
    Ok(())
}

pub async fn themes_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    reply(&bot, &message, &format_theme_list(state.orchestrator.themes())).await?;
    Ok(())
}

pub async fn describe_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    description: Option<String>,
) -> Result<()> {
    let Some(user_id) = caller_id(&message) else {
        return Ok(());
    };
    let Some(description) = description else {
        reply(
            &bot,
            &message,
            "사용법: /describe <인물 설명>\n예) /describe 단발머리에 동그란 안경을 쓴 7살 여자아이",
        )
        .await?;
        return Ok(());
    };

    let features = FeatureSet::from_manual_text(&description);
    state.cache_features(user_id, features.clone());
    reply(
        &bot,
        &message,
        &format!(
            "특징을 저장했어요. 이제 /doll 로 도안을 만들 수 있어요.\n\n{}",
            features.describe()
        ),
    )
    .await?;
    Ok(())
}

/// Downloads, downscales and analyzes the attached photo, reporting progress
/// and failures through the status message. Returns `None` when the caller
/// has already been told what went wrong.
async fn features_from_photo(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    status_id: MessageId,
) -> Result<Option<FeatureSet>> {
    let chat_id = message.chat.id;
    let Some(photo) = collect_photo(bot, message).await else {
        edit_status(bot, chat_id, status_id, "사진을 내려받지 못했어요. 다시 보내 주세요.").await;
        return Ok(None);
    };

    let max_edge = CONFIG.max_photo_edge;
    let photo = tokio::task::spawn_blocking(move || downscale_photo(photo, max_edge)).await??;

    edit_status(bot, chat_id, status_id, "사진에서 특징을 추출하는 중…").await;
    let _chat_action = start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::Typing);
    match state.extractor.extract(photo.bytes(), photo.mime_type()).await {
        Ok(features) => Ok(Some(features)),
        Err(err) => {
            warn!("Feature extraction failed: {err}");
            edit_status(
                bot,
                chat_id,
                status_id,
                &format!(
                    "특징 추출에 실패했어요: {err}\n/describe <설명> 으로 직접 입력할 수도 있어요."
                ),
            )
            .await;
            Ok(None)
        }
    }
}

pub async fn analyze_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("analyze", &message);
    if !check_access_control(&bot, &message, "analyze").await {
        complete_command_timer(&mut timer, "denied", None);
        return Ok(());
    }
    let Some(user_id) = caller_id(&message) else {
        return Ok(());
    };
    if !has_photo(&message) {
        reply(
            &bot,
            &message,
            "사진을 보내며 캡션에 /analyze 를 쓰거나, 사진에 답장으로 /analyze 를 보내 주세요.",
        )
        .await?;
        complete_command_timer(&mut timer, "no_photo", None);
        return Ok(());
    }
    if is_rate_limited(user_id) {
        reply(&bot, &message, "잠시 후에 다시 시도해 주세요.").await?;
        complete_command_timer(&mut timer, "rate_limited", None);
        return Ok(());
    }

    let status = reply(&bot, &message, "사진을 받는 중…").await?;
    let Some(features) = features_from_photo(&bot, &state, &message, status.id).await? else {
        complete_command_timer(&mut timer, "error", Some("extraction".to_string()));
        return Ok(());
    };

    state.cache_features(user_id, features.clone());
    edit_status(
        &bot,
        message.chat.id,
        status.id,
        &format!(
            "추출한 특징이에요. 이제 /doll 로 도안을 만들 수 있어요.\n\n{}",
            features.describe()
        ),
    )
    .await;
    complete_command_timer(&mut timer, "success", None);
    Ok(())
}

async fn deliver_style_result(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    reply_to: MessageId,
    result: &StyleResult,
) {
    let name = style_name(state.orchestrator.styles(), &result.style_id);

    for (stage, artifact) in result.artifacts() {
        let caption = format!("{} · {}", name, stage.display_name());
        let file_name = format!(
            "{}-{}.{}",
            result.style_id,
            stage.as_str(),
            artifact.file_extension()
        );
        if let Err(err) =
            send_photo_with_retry(bot, chat_id, artifact.bytes(), &file_name, &caption, Some(reply_to))
                .await
        {
            warn!(style = %result.style_id, stage = %stage, "send_photo failed, sending as document: {err}");
            if let Err(err) =
                send_document_with_retry(bot, chat_id, artifact.bytes(), &file_name, Some(reply_to))
                    .await
            {
                error!(style = %result.style_id, stage = %stage, "Failed to deliver artifact: {err}");
            }
        }
    }

    if let Some((stage, failure)) = &result.failure {
        let text = format!(
            "⚠️ {} 스타일의 {} 단계가 실패했어요: {}",
            name,
            stage.display_name(),
            failure
        );
        if let Err(err) = send_message_with_retry(bot, chat_id, &text, Some(reply_to)).await {
            warn!("Failed to report style failure: {err}");
        }
    }
}

pub async fn doll_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    raw_args: Option<String>,
    mode: RunMode,
) -> Result<()> {
    let command = mode.command();
    let mut timer = start_command_timer(command, &message);
    if mode == RunMode::Persist && !check_access_control(&bot, &message, command).await {
        complete_command_timer(&mut timer, "denied", None);
        return Ok(());
    }
    let user_id = caller_id(&message).unwrap_or(message.chat.id.0);
    if is_rate_limited(user_id) {
        reply(&bot, &message, "잠시 후에 다시 시도해 주세요.").await?;
        complete_command_timer(&mut timer, "rate_limited", None);
        return Ok(());
    }

    let args = match parse_doll_args(
        raw_args.as_deref().unwrap_or_default(),
        CONFIG.max_styles_per_request,
    ) {
        Ok(args) => args,
        Err(err) => {
            reply(&bot, &message, &format!("{err}\n옵션은 /help 를 참고해 주세요.")).await?;
            complete_command_timer(&mut timer, "bad_args", Some(err.to_string()));
            return Ok(());
        }
    };

    let chat_id = message.chat.id;
    let status = reply(&bot, &message, "준비 중…").await?;
    let features = if has_photo(&message) {
        match features_from_photo(&bot, &state, &message, status.id).await? {
            Some(features) => {
                state.cache_features(user_id, features.clone());
                features
            }
            None => {
                complete_command_timer(&mut timer, "error", Some("extraction".to_string()));
                return Ok(());
            }
        }
    } else if let Some(features) = state.cached_features(user_id) {
        features
    } else {
        edit_status(
            &bot,
            chat_id,
            status.id,
            "사진이 필요해요. 사진과 함께 보내거나 사진에 답장해 주세요. (/analyze, /describe 로 미리 특징을 저장할 수도 있어요)",
        )
        .await;
        complete_command_timer(&mut timer, "no_features", None);
        return Ok(());
    };

    let mut notes = args.notes;
    notes.extend(unknown_id_notes(&state, &args.request));
    if !notes.is_empty() {
        send_message_with_retry(&bot, chat_id, &notes.join("\n"), Some(message.id)).await?;
    }

    info!(
        command = command,
        user_id,
        styles = ?args.request.style_ids,
        theme = ?args.request.theme_id,
        "Starting paper-doll generation"
    );
    let _chat_action = start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto);
    let (mut events, handle) = state.orchestrator.clone().spawn(
        features.clone(),
        args.request,
        PIPELINE_EVENT_BUFFER,
    );

    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::StageStarted {
                style_id,
                stage,
                style_index,
                style_count,
            } => {
                let name = style_name(state.orchestrator.styles(), &style_id);
                edit_status(
                    &bot,
                    chat_id,
                    status.id,
                    &progress_text(name, stage, style_index, style_count),
                )
                .await;
            }
            PipelineEvent::StageCompleted { .. } => {}
            PipelineEvent::StageFailed {
                style_id,
                stage,
                failure,
            } => {
                warn!(style = %style_id, stage = %stage, "Stage failed: {failure}");
            }
            PipelineEvent::StyleFinished(result) => {
                deliver_style_result(&bot, &state, chat_id, message.id, &result).await;
            }
        }
    }

    let results = handle.await?;
    edit_status(&bot, chat_id, status.id, &completion_text(&results, mode)).await;

    if mode == RunMode::Persist && has_artifacts(&results) {
        state
            .recorder
            .spawn_record(user_id.to_string(), features.summary_text(), results);
    }
    complete_command_timer(&mut timer, "success", None);
    Ok(())
}

pub async fn status_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !check_access_control(&bot, &message, "status").await {
        return Ok(());
    }
    let report = build_status_report(&state).await;
    reply(&bot, &message, &report).await?;
    Ok(())
}

pub async fn history_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !check_access_control(&bot, &message, "history").await {
        return Ok(());
    }
    let Some(user_id) = caller_id(&message) else {
        return Ok(());
    };
    let rows = state
        .db
        .list_by_owner(&user_id.to_string(), CONFIG.history_page_size)
        .await?;
    reply(&bot, &message, &format_history("내 도안 기록", &rows, false)).await?;
    Ok(())
}

pub async fn gallery_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let rows = state.db.list_recent(CONFIG.history_page_size).await?;
    reply(&bot, &message, &format_history("최근 도안 갤러리", &rows, true)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paperdoll::pipeline::StageFailure;
    use crate::paperdoll::ports::PipelineArtifact;
    use chrono::{TimeZone, Utc};

    fn row(owner: &str, style: &str, color: Option<&str>) -> GenerationRow {
        GenerationRow {
            id: 1,
            owner: owner.to_string(),
            features_summary: "단발머리 여자아이".to_string(),
            style_id: style.to_string(),
            line_art_url: Some("file:///g/1-lineart.png".to_string()),
            color_url: color.map(str::to_string),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn style_list_marks_default() {
        let text = format_style_list(&StyleRegistry::builtin());
        assert!(text.contains("simple"));
        assert!(text.contains("(기본)"));
        assert_eq!(text.matches("(기본)").count(), 1);
    }

    #[test]
    fn theme_list_names_every_theme() {
        let themes = ThemeRegistry::builtin();
        let text = format_theme_list(&themes);
        for theme in themes.list() {
            assert!(text.contains(&theme.id));
        }
    }

    #[test]
    fn history_text_lists_urls() {
        let rows = vec![row("7", "noir", Some("file:///g/1-color.png"))];
        let mine = format_history("기록", &rows, false);
        assert!(mine.contains("2026-03-01 09:30 · noir"));
        assert!(!mine.contains("#7"));
        assert!(mine.contains("도안: file:///g/1-lineart.png"));
        assert!(mine.contains("컬러: file:///g/1-color.png"));

        let line_art_only = format_history("기록", &[row("7", "sd", None)], false);
        assert!(!line_art_only.contains("컬러:"));
        assert!(format_history("기록", &[], false).contains("아직 기록이 없어요"));
    }

    #[test]
    fn gallery_shows_one_preview_per_row() {
        let rows = vec![
            row("7", "noir", Some("file:///g/1-color.png")),
            row("8", "sd", None),
        ];
        let text = format_history("갤러리", &rows, true);
        assert!(text.contains("2026-03-01 09:30 · noir · #7\n  file:///g/1-color.png"));
        assert!(text.contains("sd · #8\n  file:///g/1-lineart.png"));
        assert!(!text.contains("도안:"));
        assert!(!text.contains("단발머리"));
    }

    #[test]
    fn completion_text_counts_failures() {
        let mut ok = StyleResult::new("simple");
        ok.record(Stage::Character, PipelineArtifact::new(vec![1u8], "image/png"));
        let mut failed = StyleResult::new("noir");
        failed.fail(Stage::Character, StageFailure::NoImageReturned);
        let results = ResultSet {
            results: vec![ok, failed],
            abandoned: false,
        };
        assert_eq!(
            completion_text(&results, RunMode::Demo),
            "완료: 1/2 스타일 성공. 데모 실행이라 저장하지 않았어요."
        );
        assert!(completion_text(&results, RunMode::Persist).contains("/history"));
    }

    #[test]
    fn progress_is_one_based() {
        assert_eq!(
            progress_text("심플", Stage::LineArt, 0, 2),
            "[1/2] 심플 · 도안 생성 중…"
        );
    }

    #[test]
    fn clip_counts_chars() {
        assert_eq!(clip("가나다라", 2), "가나…");
        assert_eq!(clip("abc", 5), "abc");
    }
}
