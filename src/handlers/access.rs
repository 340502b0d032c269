use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use tracing::{info, warn};

use crate::config::CONFIG;

static RATE_LIMITS: Lazy<Mutex<HashMap<i64, Instant>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static WHITELIST_CACHE: Lazy<Mutex<Option<Vec<String>>>> = Lazy::new(|| Mutex::new(None));
static WHITELIST_LOADED: AtomicBool = AtomicBool::new(false);

/// Telegram user id of the sender, the owner key for history rows.
pub fn caller_id(message: &Message) -> Option<i64> {
    message
        .from
        .as_ref()
        .and_then(|user| i64::try_from(user.id.0).ok())
}

fn rate_limited_at(
    limits: &mut HashMap<i64, Instant>,
    user_id: i64,
    now: Instant,
    window: Duration,
) -> bool {
    if let Some(last) = limits.get(&user_id) {
        if now.duration_since(*last) < window {
            return true;
        }
    }
    limits.insert(user_id, now);
    false
}

pub fn is_rate_limited(user_id: i64) -> bool {
    let window = Duration::from_secs(CONFIG.rate_limit_seconds);
    if window.is_zero() {
        return false;
    }
    rate_limited_at(&mut RATE_LIMITS.lock(), user_id, Instant::now(), window)
}

fn parse_whitelist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}

pub fn load_whitelist() {
    if WHITELIST_LOADED.swap(true, Ordering::SeqCst) {
        return;
    }

    let path = &CONFIG.whitelist_file_path;
    let mut cache = WHITELIST_CACHE.lock();
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let ids = parse_whitelist(&content);
            info!("Loaded whitelist file {} ({} entries)", path, ids.len());
            *cache = Some(ids);
        }
        Err(err) => {
            warn!(
                "Whitelist file {} not found or failed to read ({}); every caller is allowed",
                path, err
            );
            *cache = None;
        }
    }
}

fn is_listed(id: i64) -> bool {
    if !WHITELIST_LOADED.load(Ordering::SeqCst) {
        load_whitelist();
    }
    match &*WHITELIST_CACHE.lock() {
        None => true,
        Some(list) => list.contains(&id.to_string()),
    }
}

pub fn is_access_allowed(user_id: i64, chat_id: i64) -> bool {
    is_listed(user_id) || is_listed(chat_id)
}

/// Generation and history commands need a known, allowed caller.
pub async fn check_access_control(bot: &Bot, message: &Message, command: &str) -> bool {
    let Some(user_id) = caller_id(message) else {
        warn!(command = command, "Rejected command without a sender");
        return false;
    };
    let chat_id = message.chat.id.0;

    if !is_access_allowed(user_id, chat_id) {
        info!(command = command, user_id, chat_id, "Caller is not on the allow-list");
        let _ = bot
            .send_message(
                message.chat.id,
                "이 명령을 사용할 권한이 없어요. 관리자에게 문의해 주세요.",
            )
            .reply_parameters(ReplyParameters::new(message.id))
            .await;
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_blocks_within_window() {
        let mut limits = HashMap::new();
        let start = Instant::now();
        let window = Duration::from_secs(15);

        assert!(!rate_limited_at(&mut limits, 1, start, window));
        assert!(rate_limited_at(&mut limits, 1, start + Duration::from_secs(5), window));
        assert!(!rate_limited_at(&mut limits, 2, start + Duration::from_secs(5), window));
        assert!(!rate_limited_at(&mut limits, 1, start + Duration::from_secs(16), window));
    }

    #[test]
    fn whitelist_skips_comments_and_blanks() {
        let ids = parse_whitelist("# admins\n 42 \n\n-1001234\n#99\n");
        assert_eq!(ids, vec!["42".to_string(), "-1001234".to_string()]);
    }
}
