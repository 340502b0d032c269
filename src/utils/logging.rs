use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::utils::timing::TIMING_TARGET;

const LOGS_DIR: &str = "logs";

/// Keeps the non-blocking writers flushing until dropped at shutdown.
pub struct LoggingGuards {
    _file_guard: WorkerGuard,
    _timing_guard: WorkerGuard,
    _json_file_guard: WorkerGuard,
    _json_timing_guard: WorkerGuard,
}

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn general_targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target(TIMING_TARGET, LevelFilter::OFF)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("hyper_util", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN)
        .with_target("sqlx", LevelFilter::WARN)
}

fn timing_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

pub fn init_logging(log_level: &str) -> LoggingGuards {
    let logs_dir = Path::new(LOGS_DIR);
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory: {err}");
    }

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "paperdoll.log"));
    let (timing_writer, timing_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "timing.log"));
    let (json_file_writer, json_file_guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::daily(logs_dir, "paperdoll.jsonl"),
    );
    let (json_timing_writer, json_timing_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "timing.jsonl"));

    let general_filter = general_targets(parse_log_level(log_level));
    let timing_filter = timing_targets();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(general_filter.clone());
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(general_filter.clone());
    let timing_layer = tracing_subscriber::fmt::layer()
        .with_writer(timing_writer)
        .with_ansi(false)
        .with_filter(timing_filter.clone());
    let json_file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(json_file_writer)
        .with_filter(general_filter);
    let json_timing_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(json_timing_writer)
        .with_filter(timing_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .with(timing_layer)
        .with(json_file_layer)
        .with(json_timing_layer)
        .init();

    LoggingGuards {
        _file_guard: file_guard,
        _timing_guard: timing_guard,
        _json_file_guard: json_file_guard,
        _json_timing_guard: json_timing_guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_default_to_info() {
        assert_eq!(parse_log_level(" WARNING "), LevelFilter::WARN);
        assert_eq!(parse_log_level("verbose"), LevelFilter::INFO);
        assert_eq!(parse_log_level("off"), LevelFilter::OFF);
    }

    #[test]
    fn timing_events_only_reach_timing_files() {
        let general = general_targets(LevelFilter::DEBUG);
        assert!(!general.would_enable(TIMING_TARGET, &tracing::Level::INFO));
        assert!(general.would_enable("paperdoll_bot::paperdoll", &tracing::Level::DEBUG));
        assert!(!general.would_enable("reqwest", &tracing::Level::INFO));

        let timing = timing_targets();
        assert!(timing.would_enable(TIMING_TARGET, &tracing::Level::INFO));
        assert!(!timing.would_enable("paperdoll_bot::db", &tracing::Level::ERROR));
    }
}
