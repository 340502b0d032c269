use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::paperdoll::styles::DEFAULT_STYLE_ID;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_vision_model: String,
    pub gemini_image_model: String,
    pub gemini_safety_settings: String,
    pub analyze_timeout_seconds: u64,
    pub stage_timeout_seconds: u64,
    pub artifact_dir: PathBuf,
    pub public_base_url: String,
    pub face_reference_path: PathBuf,
    pub style_catalog_path: Option<PathBuf>,
    pub theme_catalog_path: Option<PathBuf>,
    pub default_style: String,
    pub max_styles_per_request: usize,
    pub history_page_size: i64,
    pub rate_limit_seconds: u64,
    pub whitelist_file_path: String,
    pub max_photo_edge: u32,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

fn default_public_base_url(artifact_dir: &PathBuf) -> String {
    let absolute = if artifact_dir.is_absolute() {
        artifact_dir.clone()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(artifact_dir)
    };
    format!("file://{}", absolute.display())
}

fn clamp_page_size(value: usize) -> i64 {
    value.clamp(1, 50) as i64
}

impl Config {
    pub fn load() -> Result<Self> {
        let artifact_dir = PathBuf::from(env_string("ARTIFACT_DIR", "generated"));
        let public_base_url = match env::var("PUBLIC_BASE_URL") {
            Ok(value) if !value.trim().is_empty() => value.trim().trim_end_matches('/').to_string(),
            _ => default_public_base_url(&artifact_dir),
        };

        let mut default_style = env_string("DEFAULT_STYLE", DEFAULT_STYLE_ID)
            .trim()
            .to_lowercase();
        if default_style.is_empty() {
            default_style = DEFAULT_STYLE_ID.to_string();
        }

        Ok(Config {
            bot_token: env_string("BOT_TOKEN", "").trim().to_string(),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            database_url: env_string("DATABASE_URL", "sqlite://paperdoll.db")
                .trim()
                .to_string(),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_vision_model: env_string("GEMINI_VISION_MODEL", "gemini-2.0-flash"),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-3-pro-image-preview"),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            analyze_timeout_seconds: env_u64("ANALYZE_TIMEOUT_SECONDS", 30).max(1),
            stage_timeout_seconds: env_u64("STAGE_TIMEOUT_SECONDS", 60).max(1),
            artifact_dir,
            public_base_url,
            face_reference_path: env_path("FACE_REFERENCE_PATH")
                .unwrap_or_else(|| PathBuf::from("public/previews/face-reference.jpg")),
            style_catalog_path: env_path("STYLE_CATALOG_PATH"),
            theme_catalog_path: env_path("THEME_CATALOG_PATH"),
            default_style,
            max_styles_per_request: env_usize("MAX_STYLES_PER_REQUEST", 4).max(1),
            history_page_size: clamp_page_size(env_usize("HISTORY_PAGE_SIZE", 20)),
            rate_limit_seconds: env_u64("RATE_LIMIT_SECONDS", 15),
            whitelist_file_path: env_string("WHITELIST_FILE_PATH", "allowed_chat.txt"),
            max_photo_edge: env_u64("MAX_PHOTO_EDGE", 1536).clamp(256, 4096) as u32,
        })
    }

    /// Bot mode needs a token; the CLI does not.
    pub fn require_bot_token(&self) -> Result<&str> {
        if self.bot_token.is_empty() {
            return Err(anyhow::anyhow!("BOT_TOKEN is required"));
        }
        Ok(&self.bot_token)
    }
}

pub const FEATURE_EXTRACTION_PROMPT: &str = r#"이 사진의 인물을 종이인형 캐릭터로 만들기 위해 외형 특징을 추출해줘.

반드시 아래 형식의 JSON으로만 답변:
{
  "gender": "여자/남자/기타",
  "age": "추정 나이 (예: 7살)",
  "skin_tone": "피부톤(예: 밝은 웜톤, 올리브톤 등)",
  "hair_style": "머리 스타일 상세(길이, 색상, 결, 앞머리)",
  "hair_color": "헤어 컬러(확실하면)",
  "eye_color": "눈동자/속눈썹/인상 포인트",
  "face_shape": "얼굴형",
  "face_features": "콧날/입술/광대/턱선 등 특징",
  "eyes": "눈 특징",
  "glasses": "안경 정보 (없으면 null)",
  "body_type": "체형",
  "posture": "기본 자세/비율 참고 포인트",
  "clothing_style_hint": "기존 옷 느낌(캐주얼, 포멀, 한복 등)",
  "accessories": "액세서리 목록",
  "distinctive": "기타 특징적인 요소",
  "emotion": "기본 표정/분위기",
  "summary": "종이인형 변환용 2~3문장 한국어 요약"
}
요구사항:
- JSON 외 텍스트/코드블록/마크다운은 금지
- 값이 불명확하면 "null" 또는 "unknown"로 처리
"#;

pub const HELP_TEXT: &str = "종이인형 도안 봇

1) 사진을 보내며 캡션에 /doll 을 쓰거나, 사진에 답장으로 /doll 을 보내세요.
2) /analyze 로 특징만 먼저 추출해 둘 수도 있어요. 이후 /doll 은 저장된 특징을 사용합니다.
3) 사진 대신 /describe <설명> 으로 특징을 직접 입력할 수 있어요.

옵션 (key=value):
- styles=simple,pastel  스타일 목록 (/styles)
- theme=princess        테마 의상 (/themes)
- outputs=character,lineart,color
- lineart=true|false    캐릭터/도안을 흑백 컬러링북으로
- ratio=\"3-head-tall\"  비율 지정
- preset=soft|balanced|bold
- extra=나머지 모든 텍스트는 추가 요구사항

/demo 는 같은 기능을 저장 없이 실행합니다.
/history 내 기록, /gallery 전체 최근 기록, /status 상태 확인";
