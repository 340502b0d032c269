use once_cell::sync::Lazy;
use regex::Regex;

use crate::paperdoll::pipeline::{PipelineRequest, StageSet};
use crate::paperdoll::prompt::ColorPreset;

static OPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([A-Za-z_]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|(\S*))"#)
        .expect("option regex is valid")
});

/// A parsed `/doll` argument line plus anything worth telling the user.
#[derive(Debug, Clone)]
pub struct DollArgs {
    pub request: PipelineRequest,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DollArgsError {
    #[error("알 수 없는 출력 단계: {0} (character, lineart, color 중에서 선택)")]
    InvalidOutputs(String),
    #[error("lineart 값은 true 또는 false 여야 해요: {0}")]
    InvalidFlag(String),
    #[error("{0} 값이 비어 있어요")]
    EmptyValue(String),
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "y" => Some(true),
        "false" | "no" | "off" | "0" | "n" => Some(false),
        _ => None,
    }
}

/// Splits a comma list into lowercase ids, dropping blanks and repeats.
pub fn parse_style_list(value: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in value
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
    {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parses `key=value` tokens. `extra=` takes the rest of the line, and any
/// free text that is not an option is treated as extra detail too.
pub fn parse_doll_args(text: &str, max_styles: usize) -> Result<DollArgs, DollArgsError> {
    let mut request = PipelineRequest::new(Vec::new());
    let mut notes = Vec::new();
    let mut extra_parts: Vec<String> = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let Some(caps) = OPTION_RE.captures(rest) else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            extra_parts.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
            continue;
        };

        let key = caps[1].to_ascii_lowercase();
        if key == "extra" {
            let after_key = &rest[rest.find('=').map(|i| i + 1).unwrap_or(rest.len())..];
            let value = strip_quotes(after_key);
            if !value.is_empty() {
                extra_parts.push(value.to_string());
            }
            break;
        }

        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().trim())
            .unwrap_or_default()
            .to_string();
        let consumed = caps[0].len();
        rest = rest[consumed..].trim_start();

        match key.as_str() {
            "styles" | "style" => {
                let mut ids = parse_style_list(&value);
                if ids.is_empty() {
                    return Err(DollArgsError::EmptyValue(key.clone()));
                }
                if ids.len() > max_styles {
                    notes.push(format!(
                        "스타일은 한 번에 {}개까지만 생성해요: {}",
                        max_styles,
                        ids[..max_styles].join(", ")
                    ));
                    ids.truncate(max_styles);
                }
                request.style_ids = ids;
            }
            "theme" => {
                let theme = value.trim().to_lowercase();
                request.theme_id = if theme.is_empty() || theme == "none" {
                    None
                } else {
                    Some(theme)
                };
            }
            "outputs" | "output" => {
                request.outputs =
                    StageSet::parse_list(&value).map_err(DollArgsError::InvalidOutputs)?;
            }
            "lineart" | "line_art" | "coloring" => {
                request.options.line_art_only =
                    parse_bool_flag(&value).ok_or(DollArgsError::InvalidFlag(value))?;
            }
            "ratio" => {
                if value.is_empty() {
                    return Err(DollArgsError::EmptyValue(key.clone()));
                }
                request.options.ratio_override = Some(value);
            }
            "preset" => {
                let preset = ColorPreset::parse_or_default(&value);
                if preset.as_str() != value.to_ascii_lowercase() {
                    notes.push(format!(
                        "알 수 없는 컬러 프리셋 '{}' → {}",
                        value,
                        preset.as_str()
                    ));
                }
                request.options.color_preset = preset;
            }
            _ => extra_parts.push(caps[0].to_string()),
        }
    }

    let extra = extra_parts.join(" ");
    if !extra.trim().is_empty() {
        request.options.extra_detail = Some(extra.trim().to_string());
    }

    Ok(DollArgs { request, notes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paperdoll::pipeline::Stage;

    #[test]
    fn empty_line_keeps_defaults() {
        let args = parse_doll_args("", 4).unwrap();
        assert!(args.request.style_ids.is_empty());
        assert_eq!(args.request.theme_id, None);
        assert_eq!(args.request.outputs, StageSet::all());
        assert!(args.request.options.line_art_only);
        assert!(args.notes.is_empty());
    }

    #[test]
    fn parses_every_option() {
        let args = parse_doll_args(
            r#"styles=Simple,pastel,simple theme=hanbok outputs=character,lineart lineart=false ratio="3-head-tall chibi" preset=bold"#,
            4,
        )
        .unwrap();
        let request = args.request;
        assert_eq!(request.style_ids, vec!["simple", "pastel"]);
        assert_eq!(request.theme_id.as_deref(), Some("hanbok"));
        assert!(request.outputs.contains(Stage::Character));
        assert!(request.outputs.contains(Stage::LineArt));
        assert!(!request.outputs.contains(Stage::Color));
        assert!(!request.options.line_art_only);
        assert_eq!(
            request.options.ratio_override.as_deref(),
            Some("3-head-tall chibi")
        );
        assert_eq!(request.options.color_preset, ColorPreset::Bold);
        assert_eq!(request.options.extra_detail, None);
    }

    #[test]
    fn extra_consumes_rest_of_line() {
        let args = parse_doll_args("theme=ballet extra=리본 머리띠 추가 styles=noir", 4).unwrap();
        assert_eq!(args.request.theme_id.as_deref(), Some("ballet"));
        assert!(args.request.style_ids.is_empty());
        assert_eq!(
            args.request.options.extra_detail.as_deref(),
            Some("리본 머리띠 추가 styles=noir")
        );
    }

    #[test]
    fn free_text_becomes_extra_detail() {
        let args = parse_doll_args("웃는 표정으로 styles=sd 해주세요", 4).unwrap();
        assert_eq!(args.request.style_ids, vec!["sd"]);
        assert_eq!(
            args.request.options.extra_detail.as_deref(),
            Some("웃는 표정으로 해주세요")
        );
    }

    #[test]
    fn style_list_is_capped_with_note() {
        let args = parse_doll_args("styles=a,b,c", 2).unwrap();
        assert_eq!(args.request.style_ids, vec!["a", "b"]);
        assert_eq!(args.notes.len(), 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            parse_doll_args("outputs=sketch", 4).unwrap_err(),
            DollArgsError::InvalidOutputs("sketch".to_string())
        );
        assert_eq!(
            parse_doll_args("lineart=maybe", 4).unwrap_err(),
            DollArgsError::InvalidFlag("maybe".to_string())
        );
        assert!(matches!(
            parse_doll_args("styles=,", 4),
            Err(DollArgsError::EmptyValue(_))
        ));
    }

    #[test]
    fn unknown_preset_falls_back_with_note() {
        let args = parse_doll_args("preset=neon theme=none", 4).unwrap();
        assert_eq!(args.request.options.color_preset, ColorPreset::Balanced);
        assert_eq!(args.request.theme_id, None);
        assert_eq!(args.notes.len(), 1);
    }
}
