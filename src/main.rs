use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod cli;
mod config;
mod db;
mod handlers;
mod llm;
mod paperdoll;
mod state;
mod storage;
mod utils;

use cli::{parse_generate_args, run_generate};
use config::CONFIG;
use db::database::Database;
use handlers::commands::{self, RunMode};
use paperdoll::results::HistoryRecorder;
use state::{AppState, Engine};
use storage::LocalArtifactStore;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "종이인형 도안 봇 명령어:")]
enum Command {
    #[command(description = "시작")]
    Start,
    #[command(description = "사용법")]
    Help,
    #[command(description = "스타일 목록")]
    Styles,
    #[command(description = "테마 목록")]
    Themes,
    #[command(description = "특징 직접 입력")]
    Describe(String),
    #[command(description = "사진에서 특징 추출")]
    Analyze,
    #[command(description = "종이인형 도안 생성")]
    Doll(String),
    #[command(description = "저장 없이 생성")]
    Demo(String),
    #[command(description = "내 기록")]
    History,
    #[command(description = "최근 갤러리")]
    Gallery,
    #[command(description = "상태 확인")]
    Status,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_level);

    let args: Vec<String> = std::env::args().collect();
    if let Some(generate_args) = parse_generate_args(&args, CONFIG.max_styles_per_request)? {
        let summary = run_generate(&CONFIG, generate_args).await?;
        info!(
            "Generate summary: styles={} failed={} files={}",
            summary.styles,
            summary.failed_styles,
            summary.files_written.len()
        );
        for path in &summary.files_written {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let token = CONFIG.require_bot_token()?.to_string();
    let bot = Bot::new(token);
    info!("Starting paper-doll bot");

    let engine = Engine::from_config(&CONFIG)?;
    let db = Database::init(&CONFIG.database_url).await?;
    let artifact_store = LocalArtifactStore::new(&CONFIG.artifact_dir, &CONFIG.public_base_url)?;
    info!(
        "Artifacts are stored under {} and served from {}",
        artifact_store.root().display(),
        CONFIG.public_base_url
    );
    let recorder = HistoryRecorder::new(Arc::new(artifact_store), Arc::new(db.clone()));
    let state = AppState::new(db.clone(), engine, recorder);

    handlers::access::load_whitelist();

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    // Telegram delivers "/doll ..." typed under a photo as a caption.
    let caption_command_handler = dptree::filter_map(|message: Message, me: Me| {
        let caption = message.caption()?;
        Command::parse(caption, me.username()).ok()
    })
    .endpoint(handle_command);

    let handler = Update::filter_message()
        .branch(command_handler)
        .branch(caption_command_handler)
        .endpoint(ignore_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Queued history rows are written before the process exits.
    match db.flush().await {
        Ok(()) => info!("History writer drained; shutting down"),
        Err(err) => warn!("Failed to drain history writer on shutdown: {err}"),
    }

    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    fn optional_arg(arg: String) -> Option<String> {
        if arg.trim().is_empty() {
            None
        } else {
            Some(arg)
        }
    }

    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::Styles => commands::styles_handler(bot, state, message).await?,
        Command::Themes => commands::themes_handler(bot, state, message).await?,
        Command::Describe(arg) => {
            commands::describe_handler(bot, state, message, optional_arg(arg)).await?
        }
        Command::Analyze => {
            tokio::spawn(async move {
                if let Err(err) = commands::analyze_handler(bot, state, message).await {
                    error!("analyze handler failed: {err}");
                }
            });
        }
        Command::Doll(arg) => {
            let arg = optional_arg(arg);
            tokio::spawn(async move {
                if let Err(err) =
                    commands::doll_handler(bot, state, message, arg, RunMode::Persist).await
                {
                    error!("doll handler failed: {err}");
                }
            });
        }
        Command::Demo(arg) => {
            let arg = optional_arg(arg);
            tokio::spawn(async move {
                if let Err(err) =
                    commands::doll_handler(bot, state, message, arg, RunMode::Demo).await
                {
                    error!("demo handler failed: {err}");
                }
            });
        }
        Command::History => {
            tokio::spawn(async move {
                if let Err(err) = commands::history_handler(bot, state, message).await {
                    error!("history handler failed: {err}");
                }
            });
        }
        Command::Gallery => {
            tokio::spawn(async move {
                if let Err(err) = commands::gallery_handler(bot, state, message).await {
                    error!("gallery handler failed: {err}");
                }
            });
        }
        Command::Status => commands::status_handler(bot, state, message).await?,
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
