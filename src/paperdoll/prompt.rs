//! Instruction builders for the three generation stages.
//!
//! Every composer is a pure function of its inputs. Each returns a [`Prompt`]
//! whose optional override block is always rendered after every other block,
//! so an instruction-following model reads it as the final word.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::paperdoll::features::{FeatureKey, FeatureSet, FeatureSource};
use crate::paperdoll::pipeline::Stage;
use crate::paperdoll::styles::{OutfitSpec, StyleDefinition};
use crate::paperdoll::themes::ThemeDefinition;

/// Negative directive emitted whenever glasses must not be drawn.
pub const GLASSES_FORBIDDEN: &str = "Do NOT add glasses";

const FACE_REFERENCE_GUIDE: &str = "FACE STYLE REFERENCE (MANDATORY for all styles):
- Eyes: Large round eyes occupying ~30% of face area. Double highlight dots (large white circle + small sparkle). Thick upper lash line with 3-4 individual lash spikes at outer corner. Clean lower lash line. Iris is large and dark with subtle gradient.
- Eyebrows: Thin, soft, natural arch. NOT thick or angular.
- Nose: Minimal, a tiny soft dot or very short vertical line. Never a full nose bridge.
- Mouth: Small gentle smile. Upper lip is a soft \"m\" shape, lower lip barely visible. Lip width no wider than the distance between inner eye corners.
- Face shape: Soft V-line chin, rounded forehead, smooth cheeks. NOT angular, NOT square. The chin tapers gently, never pointed.
- Overall: The face must look CUTE and PRETTY, like a high-quality children's illustration doll. Friendly, approachable, appealing.
- Hair framing: Bangs frame the forehead softly. Side hair follows the character's own hair description.
- Expression: Default gentle smile, warm and inviting.";

const FACE_GUIDE_CLOSING: &str =
    "This face quality is the MINIMUM STANDARD. Every generated face must be at least this attractive.";

const FEATURE_TEMPLATE_RULE: &str = "Apply the character template from extracted features (hair, face shape, glasses, accessories, skin/eye tone).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPreset {
    Soft,
    #[default]
    Balanced,
    Bold,
}

impl ColorPreset {
    /// Unknown or empty values fall back to `Balanced`.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "soft" => ColorPreset::Soft,
            "bold" => ColorPreset::Bold,
            _ => ColorPreset::Balanced,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorPreset::Soft => "soft",
            ColorPreset::Balanced => "balanced",
            ColorPreset::Bold => "bold",
        }
    }

    pub fn modifier(self) -> &'static str {
        match self {
            ColorPreset::Soft => {
                "Apply soft, smooth tones with subtle shadows. Keep saturation low and edges gentle."
            }
            ColorPreset::Balanced => {
                "Apply vibrant and balanced colors with mild shading. Clear color separation."
            }
            ColorPreset::Bold => {
                "Apply saturated colors with clear contrast and expressive highlights. Rich and punchy."
            }
        }
    }
}

/// Per-run knobs shared by all three composers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    pub ratio_override: Option<String>,
    /// Coloring-book output for the character and line-art stages.
    pub line_art_only: bool,
    pub extra_detail: Option<String>,
    pub color_preset: ColorPreset,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            ratio_override: None,
            line_art_only: true,
            extra_detail: None,
            color_preset: ColorPreset::Balanced,
        }
    }
}

impl GenerationOptions {
    fn ratio_override(&self) -> Option<&str> {
        non_blank(self.ratio_override.as_deref())
    }

    fn extra_detail(&self) -> Option<&str> {
        non_blank(self.extra_detail.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// A composed instruction, kept as ordered blocks until it is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    stage: Stage,
    blocks: Vec<String>,
    override_block: Option<String>,
}

impl Prompt {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            blocks: Vec::new(),
            override_block: None,
        }
    }

    fn push(&mut self, block: impl Into<String>) {
        let block = block.into();
        if !block.trim().is_empty() {
            self.blocks.push(block);
        }
    }

    fn set_override(&mut self, block: String) {
        self.override_block = Some(block);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn override_block(&self) -> Option<&str> {
        self.override_block.as_deref()
    }

    pub fn render(&self) -> String {
        let mut parts: Vec<&str> = self.blocks.iter().map(String::as_str).collect();
        if let Some(block) = &self.override_block {
            parts.push(block);
        }
        parts.join("\n\n")
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn face_reference_guide(glasses_rule: &str) -> String {
    format!("{FACE_REFERENCE_GUIDE}\n- GLASSES: {glasses_rule}\n{FACE_GUIDE_CLOSING}")
}

fn rules_block(style: &StyleDefinition) -> String {
    let mut rules = Vec::with_capacity(style.strict_rules.len() + 2);
    if let Some(template) = &style.base_template {
        rules.push(format!("Base reference: {}", template));
    }
    rules.push(FEATURE_TEMPLATE_RULE.to_string());
    rules.extend(style.strict_rules.iter().cloned());
    let lines: Vec<String> = rules.iter().map(|rule| format!("- {}", rule)).collect();
    format!("RULES:\n{}", lines.join("\n"))
}

fn proportion_block(label: &str, style: &StyleDefinition, options: &GenerationOptions) -> String {
    match options.ratio_override() {
        Some(ratio) => format!(
            "{label}: {ratio}\nRATIO OVERRIDE: {ratio} takes precedence over any proportion stated in the style or theme text above or below."
        ),
        None => format!("{label}: {}", style.ratio),
    }
}

fn extra_block(options: &GenerationOptions) -> Option<String> {
    options
        .extra_detail()
        .map(|extra| format!("EXTRA CONSTRAINTS: {}", extra))
}

fn outfits_for<'a>(style: &'a StyleDefinition, theme: Option<&'a ThemeDefinition>) -> &'a [OutfitSpec] {
    match theme {
        Some(theme) => &theme.outfits,
        None => &style.outfits,
    }
}

fn quoted(features: &FeatureSet, key: FeatureKey) -> String {
    format!("\"{}\"", features.get(key).display())
}

fn personal_feature_rules(features: &FeatureSet) -> String {
    let glasses = match features.glasses() {
        Some(description) => format!(
            "- GLASSES: The character wears glasses described as \"{}\". Reproduce exactly these glasses, same shape and frame, in every style.",
            description
        ),
        None if features.source() == FeatureSource::Manual => format!(
            "- GLASSES (CRITICAL): {} unless the free-text description above EXPLICITLY states glasses.",
            GLASSES_FORBIDDEN
        ),
        None => format!(
            "- GLASSES (CRITICAL): The description states no glasses. The character MUST NOT wear glasses. {}.",
            GLASSES_FORBIDDEN
        ),
    };
    [
        "CRITICAL: PERSONAL FEATURES REPRODUCTION RULES:".to_string(),
        format!(
            "- HAIR: Reproduce the EXACT hair style {} and hair color {}. Short hair stays short. Long hair stays long. Curly stays curly. Do NOT default to generic long wavy hair.",
            quoted(features, FeatureKey::HairStyle),
            quoted(features, FeatureKey::HairColor)
        ),
        glasses,
        format!(
            "- FACE: Age {}, face shape {}, eyes {} and skin tone {} must match the description. A young child looks young, not like a teenager.",
            quoted(features, FeatureKey::Age),
            quoted(features, FeatureKey::FaceShape),
            quoted(features, FeatureKey::Eyes),
            quoted(features, FeatureKey::SkinTone)
        ),
        format!(
            "- ACCESSORIES: Reproduce {} faithfully.",
            quoted(features, FeatureKey::Accessories)
        ),
        "- The face must be PRETTY/CUTE following the face reference guide, but personal features (hair, glasses, accessories) always take priority over style defaults.".to_string(),
        "- These features MUST be consistent across ALL style variations: the character must be recognizable as the same person.".to_string(),
    ]
    .join("\n")
}

/// Character stage: identity sheet for the base doll in neutral clothing.
pub fn compose_character_prompt(
    features: &FeatureSet,
    style: &StyleDefinition,
    options: &GenerationOptions,
) -> Prompt {
    let glasses_rule = match features.glasses() {
        Some(description) => format!(
            "Draw the glasses stated in the character description ({}). The face reference image only sets face quality.",
            description
        ),
        None => format!(
            "{} unless the character description EXPLICITLY states glasses. The face reference image has NO glasses.",
            GLASSES_FORBIDDEN
        ),
    };

    let mut prompt = Prompt::new(Stage::Character);
    prompt.push("Create a single character reference illustration. This will be the BASE DOLL for a paper doll set.");
    prompt.push(format!(
        "CHARACTER IDENTITY (MUST MATCH EVERY DETAIL BELOW):\n{}",
        features.describe()
    ));
    prompt.push(face_reference_guide(&glasses_rule));
    prompt.push(personal_feature_rules(features));
    prompt.push(format!("STYLE: {}", style.tone));
    prompt.push(proportion_block("TARGET PROPORTION", style, options));
    prompt.push(rules_block(style));
    if let Some(extra) = extra_block(options) {
        prompt.push(extra);
    }
    prompt.push("OUTPUT: Full-body character, front-facing, standing upright on pure white background, arms slightly away from body. Wearing simple white tank top and white shorts (base outfit for paper doll). Single character only.");

    if options.line_art_only {
        prompt.set_override(format!(
            "RENDERING MODE: COLORING BOOK (OVERRIDES ALL COLOR INSTRUCTIONS ABOVE):
- Output must be BLACK LINES ON WHITE BACKGROUND ONLY.
- ZERO color fills, ZERO gray, ZERO shading, ZERO gradients.
- Every area must be an enclosed white region bounded by black lines, ready to be colored by hand.
- If the style mentions colors or saturated tones, IGNORE those for this render and convert everything to black outlines only.
- Keep the style's shape identity: {}.
- This is a printable coloring page.",
            style.line_art_structure
        ));
    }
    prompt
}

/// Line-art stage: the A4 sheet with the base doll on top and a 2×2 outfit grid.
pub fn compose_paperdoll_prompt(
    style: &StyleDefinition,
    theme: Option<&ThemeDefinition>,
    options: &GenerationOptions,
) -> Prompt {
    let outfits = outfits_for(style, theme);
    let outfit_lines: Vec<String> = outfits
        .iter()
        .enumerate()
        .map(|(index, outfit)| {
            format!(
                "{}) {} ({}): {}",
                index + 1,
                outfit.name,
                outfit.name_en,
                outfit.description
            )
        })
        .collect();

    let mut prompt = Prompt::new(Stage::LineArt);
    prompt.push("Create a high-quality paper doll printable sheet in A4 format.");
    prompt.push(format!("STYLE: {}", style.tone));
    prompt.push(proportion_block("PROPORTION", style, options));
    prompt.push(face_reference_guide(&format!(
        "{} unless the reference character image already wears them.",
        GLASSES_FORBIDDEN
    )));
    prompt.push(
        "LAYOUT: TWO SECTIONS ON ONE SHEET.

TOP CENTER: BASE CHARACTER (MANDATORY):
- The character in BASE OUTFIT (white tank top + white shorts), standing front-facing, arms slightly away.
- Dashed cutting line around the character.
- This base doll MUST be present. It is the foundation that outfits overlay onto.
- The base character's hair, glasses, face, and accessories must EXACTLY match the reference character image provided. Do NOT change the hairstyle and do not remove glasses the reference wears.",
    );
    prompt.push(format!(
        "BOTTOM: {} OUTFIT SETS in 2×2 grid:
- Each outfit is a separate overlay piece with dashed cut lines around it.
- Each outfit includes matching shoes/accessories as separate detachable pieces.
{}

Label each outfit with its Korean name (한글) followed by the English name in parentheses.",
        outfits.len(),
        outfit_lines.join("\n")
    ));
    if let Some(theme) = theme {
        prompt.push(format!(
            "THEME: {} ({}). {}\nRender the theme outfits in this style's tone and proportion. Where an outfit detail conflicts with a style rule, the style rule wins.",
            theme.name, theme.id, theme.lock_description
        ));
    }
    prompt.push(rules_block(style));
    if let Some(extra) = extra_block(options) {
        prompt.push(extra);
    }

    if options.line_art_only {
        prompt.set_override(format!(
            "RENDERING MODE: COLORING BOOK (OVERRIDES ALL COLOR INSTRUCTIONS ABOVE):
- ALL elements must be BLACK LINES ON WHITE BACKGROUND ONLY.
- ZERO color fills, ZERO gray tone, ZERO shading, ZERO gradients anywhere on the sheet.
- Every area is an enclosed white region bounded by black lines, ready to be hand-colored.
- If the style or outfit list mentions colors, saturated tones, or specific color palettes, IGNORE them. This is a pure black & white coloring page.
- Pixel styles: keep pixel grid structure and staircase edges, in black & white only.
- Pastel styles: keep the soft rounded line character, in black lines only.
- All styles: maintain the structural/shape identity of the style but remove ALL color.
- Shape identity to keep for this style: {}.",
            style.line_art_structure
        ));
    } else {
        prompt.push("Use line art with clean silhouettes and print-safe detail.");
    }
    prompt
}

/// Color stage: fills the previous line-art sheet without changing it.
pub fn compose_color_prompt(
    style: &StyleDefinition,
    theme: Option<&ThemeDefinition>,
    options: &GenerationOptions,
) -> Prompt {
    let directions: Vec<String> = outfits_for(style, theme)
        .iter()
        .map(|outfit| format!("  - {} ({}): {}", outfit.name, outfit.name_en, outfit.color))
        .collect();

    let mut prompt = Prompt::new(Stage::Color);
    prompt.push("Take this exact black-and-white paper doll sheet and color it.");
    prompt.push(format!("Style reminder: {}", style.tone));
    prompt.push(format!(
        "Rules:
- Keep character identity and all outlines exactly the same.
- Keep pose, outfit boundaries, dashed cut lines, and panel structure unchanged.
- Reuse the exact layout and spacing.
- Apply this color direction per outfit:
{}",
        directions.join("\n")
    ));
    let mut closing = format!("{}\nNo new design changes.", options.color_preset.modifier());
    if let Some(extra) = options.extra_detail() {
        closing.push('\n');
        closing.push_str(extra);
    }
    prompt.push(closing);
    prompt
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::paperdoll::styles::StyleRegistry;
    use crate::paperdoll::themes::ThemeRegistry;

    const COLOR_WORDS: [&str; 5] = ["color", "colour", "saturat", "palette", "gradient"];

    fn features(glasses: &str) -> FeatureSet {
        FeatureSet::from_json_value(&json!({
            "gender": "여자",
            "age": "7살",
            "hair_style": "긴 갈색 생머리",
            "hair_color": "짙은 갈색",
            "glasses": glasses,
            "summary": "밝게 웃는 7살 여자아이"
        }))
        .unwrap()
    }

    fn last_color_mention(text: &str) -> usize {
        let lowered = text.to_lowercase();
        COLOR_WORDS
            .iter()
            .filter_map(|word| lowered.rfind(word))
            .max()
            .unwrap_or(0)
    }

    fn override_start(prompt: &Prompt) -> usize {
        let rendered = prompt.render();
        let block = prompt.override_block().unwrap();
        rendered.to_lowercase().rfind(&block.to_lowercase()).unwrap()
    }

    #[test]
    fn character_prompt_is_deterministic() {
        let registry = StyleRegistry::builtin();
        let options = GenerationOptions {
            extra_detail: Some("hold a balloon".to_string()),
            ..GenerationOptions::default()
        };
        for style in registry.list() {
            let first = compose_character_prompt(&features("null"), style, &options).render();
            let second = compose_character_prompt(&features("null"), style, &options).render();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn unknown_glasses_are_explicitly_forbidden() {
        let style = StyleRegistry::builtin().get("simple").clone();
        for sentinel in ["null", "없음", "unknown", ""] {
            let prompt =
                compose_character_prompt(&features(sentinel), &style, &GenerationOptions::default());
            assert!(
                prompt.render().contains(GLASSES_FORBIDDEN),
                "sentinel {sentinel:?}"
            );
        }
    }

    #[test]
    fn typed_description_with_glasses_is_not_contradicted() {
        let style = StyleRegistry::builtin().get("simple").clone();
        let described = FeatureSet::from_manual_text("단발머리에 동그란 안경을 쓴 7살 여자아이");
        let rendered =
            compose_character_prompt(&described, &style, &GenerationOptions::default()).render();
        assert!(rendered.contains("동그란 안경"));
        assert!(!rendered.contains(GLASSES_FORBIDDEN));
        assert!(!rendered.contains("states no glasses"));

        let plain = FeatureSet::from_manual_text("단발머리 7살 여자아이");
        let rendered =
            compose_character_prompt(&plain, &style, &GenerationOptions::default()).render();
        assert!(rendered.contains(GLASSES_FORBIDDEN));
        assert!(!rendered.contains("states no glasses"));
    }

    #[test]
    fn negated_glasses_are_forbidden_not_echoed() {
        let style = StyleRegistry::builtin().get("simple").clone();
        for phrase in ["안경 없음", "no glasses", "미착용"] {
            let rendered =
                compose_character_prompt(&features(phrase), &style, &GenerationOptions::default())
                    .render();
            assert!(rendered.contains(GLASSES_FORBIDDEN), "{phrase}");
            assert!(!rendered.contains("wears glasses described as"), "{phrase}");
        }
    }

    #[test]
    fn stated_glasses_are_echoed_and_not_forbidden() {
        let registry = StyleRegistry::builtin();
        for style in registry.list() {
            let rendered = compose_character_prompt(
                &features("둥근 금테 안경"),
                style,
                &GenerationOptions::default(),
            )
            .render();
            assert!(rendered.contains("둥근 금테 안경"));
            assert!(!rendered.contains(GLASSES_FORBIDDEN), "style {}", style.id);
        }
    }

    #[test]
    fn hair_and_every_attribute_are_embedded() {
        let style = StyleRegistry::builtin().get("simple").clone();
        let rendered =
            compose_character_prompt(&features("null"), &style, &GenerationOptions::default())
                .render();
        assert!(rendered.contains("\"긴 갈색 생머리\""));
        assert!(rendered.contains("\"짙은 갈색\""));
        for key in FeatureKey::ALL {
            assert!(rendered.contains(&format!("- {}:", key.label())), "{:?}", key);
        }
        assert!(rendered.contains("white tank top and white shorts"));
    }

    #[test]
    fn rules_are_rendered_as_discrete_bullets() {
        let style = StyleRegistry::builtin().get("sd").clone();
        let rendered =
            compose_character_prompt(&features("null"), &style, &GenerationOptions::default())
                .render();
        assert!(rendered.contains("- Base reference: Use Simple Line composition"));
        assert!(rendered.contains(&format!("- {}", FEATURE_TEMPLATE_RULE)));
        for rule in &style.strict_rules {
            assert!(rendered.contains(&format!("- {}", rule)));
        }
    }

    #[test]
    fn line_art_override_is_the_last_color_directive() {
        let styles = StyleRegistry::builtin();
        let themes = ThemeRegistry::builtin();
        let options = GenerationOptions::default();
        for style in styles.list() {
            let prompts = [
                compose_character_prompt(&features("null"), style, &options),
                compose_paperdoll_prompt(style, None, &options),
                compose_paperdoll_prompt(style, themes.get("princess"), &options),
            ];
            for prompt in prompts {
                let rendered = prompt.render();
                assert!(rendered.ends_with(prompt.override_block().unwrap()));
                assert!(
                    last_color_mention(&rendered) >= override_start(&prompt),
                    "style {} stage {:?}",
                    style.id,
                    prompt.stage()
                );
            }
        }
    }

    #[test]
    fn pixel_and_pastel_keep_their_structure_under_override() {
        let styles = StyleRegistry::builtin();
        let options = GenerationOptions::default();
        let pixel = compose_paperdoll_prompt(styles.get("pastelpixel"), None, &options);
        assert!(pixel.override_block().unwrap().contains("pixel grid"));
        let pastel = compose_paperdoll_prompt(styles.get("pastel"), None, &options);
        assert!(pastel
            .override_block()
            .unwrap()
            .contains("soft rounded puffy silhouette"));
    }

    #[test]
    fn color_render_mode_has_no_override() {
        let style = StyleRegistry::builtin().get("simple").clone();
        let options = GenerationOptions {
            line_art_only: false,
            ..GenerationOptions::default()
        };
        let character = compose_character_prompt(&features("null"), &style, &options);
        assert!(character.override_block().is_none());
        let sheet = compose_paperdoll_prompt(&style, None, &options);
        assert!(sheet.override_block().is_none());
        assert!(sheet.render().contains("print-safe detail"));
    }

    #[test]
    fn paperdoll_sheet_always_lists_four_outfits() {
        let styles = StyleRegistry::builtin();
        let themes = ThemeRegistry::builtin();
        let options = GenerationOptions::default();
        let mut theme_choices: Vec<Option<&ThemeDefinition>> = vec![None];
        theme_choices.extend(themes.list().iter().map(Some));
        for style in styles.list() {
            for theme in &theme_choices {
                let rendered = compose_paperdoll_prompt(style, *theme, &options).render();
                for ordinal in 1..=4 {
                    assert!(rendered.contains(&format!("\n{}) ", ordinal)));
                }
                assert!(!rendered.contains("\n5) "));
            }
        }
    }

    #[test]
    fn theme_outfits_replace_style_outfits() {
        let style = StyleRegistry::builtin().get("kawaiimax").clone();
        let theme = ThemeRegistry::builtin().get("school").cloned().unwrap();
        let options = GenerationOptions::default();
        let sheet = compose_paperdoll_prompt(&style, Some(&theme), &options).render();
        assert!(sheet.contains("1) 세일러 교복 (Sailor Uniform): sailor collar blouse"));
        assert!(!sheet.contains("디저트"));
        assert!(sheet.contains("the style rule wins"));
        assert!(sheet.contains(&style.tone));

        let color = compose_color_prompt(&style, Some(&theme), &options).render();
        assert!(color.contains("  - 블레이저 교복 (Blazer Uniform): navy blazer"));
        assert!(!color.contains("cherry pink dress"));
    }

    #[test]
    fn paperdoll_glasses_rule_defers_to_reference() {
        let style = StyleRegistry::builtin().get("simple").clone();
        let rendered = compose_paperdoll_prompt(&style, None, &GenerationOptions::default()).render();
        assert!(rendered.contains(
            "Do NOT add glasses unless the reference character image already wears them."
        ));
    }

    #[test]
    fn ratio_override_replaces_style_proportion_and_takes_precedence() {
        let style = StyleRegistry::builtin().get("simple").clone();
        let theme = ThemeRegistry::builtin().get("ballet").cloned();
        let options = GenerationOptions {
            ratio_override: Some("2-head-tall".to_string()),
            ..GenerationOptions::default()
        };
        let character = compose_character_prompt(&features("null"), &style, &options).render();
        assert!(character.contains("TARGET PROPORTION: 2-head-tall"));
        assert!(!character.contains("TARGET PROPORTION: 4-head-tall"));
        assert!(character.contains("RATIO OVERRIDE: 2-head-tall takes precedence"));

        let sheet = compose_paperdoll_prompt(&style, theme.as_ref(), &options).render();
        assert!(sheet.contains("PROPORTION: 2-head-tall"));
        assert!(sheet.contains("RATIO OVERRIDE: 2-head-tall takes precedence"));

        let blank = GenerationOptions {
            ratio_override: Some("   ".to_string()),
            ..GenerationOptions::default()
        };
        let rendered = compose_character_prompt(&features("null"), &style, &blank).render();
        assert!(rendered.contains("TARGET PROPORTION: 4-head-tall"));
        assert!(!rendered.contains("RATIO OVERRIDE"));
    }

    #[test]
    fn color_prompt_applies_preset_and_extra_detail() {
        let style = StyleRegistry::builtin().get("simple").clone();
        let options = GenerationOptions {
            color_preset: ColorPreset::parse_or_default("BOLD"),
            extra_detail: Some("gold accents".to_string()),
            ..GenerationOptions::default()
        };
        let rendered = compose_color_prompt(&style, None, &options).render();
        assert!(rendered.contains(ColorPreset::Bold.modifier()));
        assert!(rendered.ends_with("No new design changes.\ngold accents"));
        assert!(rendered.contains("  - 캐주얼 (Casual): classic blue denim overall"));
    }

    #[test]
    fn unknown_preset_falls_back_to_balanced() {
        assert_eq!(ColorPreset::parse_or_default("neon"), ColorPreset::Balanced);
        assert_eq!(ColorPreset::parse_or_default(""), ColorPreset::Balanced);
        assert_eq!(ColorPreset::parse_or_default(" soft "), ColorPreset::Soft);
    }

    #[test]
    fn extra_constraints_precede_the_override() {
        let style = StyleRegistry::builtin().get("noir").clone();
        let options = GenerationOptions {
            extra_detail: Some("add a red scarf".to_string()),
            ..GenerationOptions::default()
        };
        let prompt = compose_paperdoll_prompt(&style, None, &options);
        let rendered = prompt.render();
        let extra_at = rendered.find("EXTRA CONSTRAINTS: add a red scarf").unwrap();
        assert!(extra_at < override_start(&prompt));
    }
}
