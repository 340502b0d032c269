use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use teloxide::types::Message;
use tracing::info;

/// Events under this target are routed to `logs/timing.*` only.
pub const TIMING_TARGET: &str = "paperdoll.timing";

const LOGGED_TEXT_CHARS: usize = 300;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    message_id: Option<i64>,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

fn clip_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => value[..index].to_string(),
        None => value.to_string(),
    }
}

impl CommandTimer {
    pub fn new(command: &str) -> Self {
        CommandTimer {
            command: command.to_string(),
            chat_id: None,
            user_id: None,
            message_id: None,
            text: None,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn from_message(command: &str, message: &Message) -> Self {
        let text = message
            .text()
            .or_else(|| message.caption())
            .map(|value| clip_chars(&value.replace('\n', " "), LOGGED_TEXT_CHARS));
        let mut timer = CommandTimer::new(command);
        timer.chat_id = Some(message.chat.id.0);
        timer.user_id = message
            .from
            .as_ref()
            .and_then(|u| i64::try_from(u.id.0).ok());
        timer.message_id = Some(message.id.0 as i64);
        timer.text = text;
        timer
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=command_received command={} chat_id={:?} user_id={:?} message_id={:?} received_at={} text={:?}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=command_completed command={} chat_id={:?} user_id={:?} message_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        if !self.completed {
            self.mark_status("dropped", None);
            self.log_completed();
        }
    }
}

pub fn start_command_timer(command: &str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

/// Wraps one external model call with request/response timing events.
pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        started_perf.elapsed().as_secs_f64(),
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipping_respects_char_boundaries() {
        assert_eq!(clip_chars("종이인형 도안", 4), "종이인형");
        assert_eq!(clip_chars("short", 300), "short");
    }

    #[test]
    fn timer_takes_ids_and_text_from_message() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "message_id": 17,
            "date": 1_718_000_000,
            "chat": {"id": 42, "type": "private", "first_name": "Mina"},
            "from": {"id": 42, "is_bot": false, "first_name": "Mina"},
            "text": "/doll styles=sd\ntheme=school"
        }))
        .unwrap();

        let mut timer = start_command_timer("doll", &message);
        assert_eq!(timer.chat_id, Some(42));
        assert_eq!(timer.user_id, Some(42));
        assert_eq!(timer.message_id, Some(17));
        assert_eq!(timer.text.as_deref(), Some("/doll styles=sd theme=school"));
        assert_eq!(timer.status, "success");

        complete_command_timer(&mut timer, "error", Some("timeout".to_string()));
        assert!(timer.completed);
        assert_eq!(timer.status, "error");
    }

    #[tokio::test]
    async fn llm_timing_passes_results_through() {
        let ok = log_llm_timing("gemini", "m", "generate_image", None, || async {
            Ok::<_, anyhow::Error>(7)
        })
        .await;
        assert_eq!(ok.unwrap(), 7);

        let err = log_llm_timing("gemini", "m", "analyze_image", None, || async {
            Err::<u8, _>(anyhow::anyhow!("boom"))
        })
        .await;
        assert!(err.is_err());
    }
}
