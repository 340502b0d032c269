use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_STYLE_ID: &str = "simple";

/// Every paper-doll sheet carries a 2×2 outfit grid.
pub type OutfitSet = [OutfitSpec; 4];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("duplicate catalog id '{0}'")]
    DuplicateId(String),
    #[error("default style '{0}' is not in the catalog")]
    UnknownDefault(String),
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutfitSpec {
    pub id: String,
    /// Korean label printed under the outfit.
    pub name: String,
    pub name_en: String,
    pub description: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDefinition {
    pub id: String,
    pub name: String,
    /// Proportion sent to the generator, e.g. `3-head-tall`.
    pub ratio: String,
    pub ratio_display: String,
    pub desc: String,
    pub desc_kr: String,
    /// Long English rendering-tone block.
    pub tone: String,
    pub tone_kr: String,
    pub outfits: OutfitSet,
    pub strict_rules: Vec<String>,
    pub strict_rules_kr: Vec<String>,
    /// Composition template text when the style is derived from another style.
    #[serde(default)]
    pub base_template: Option<String>,
    /// Shape rules that must survive a monochrome render.
    #[serde(default)]
    pub line_art_structure: String,
}

#[derive(Debug, Deserialize)]
struct StyleCatalogFile {
    #[serde(default)]
    default: Option<String>,
    styles: Vec<StyleDefinition>,
}

/// Read-only style catalog. Lookups never fail: unknown ids resolve to the
/// default style.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    styles: Vec<StyleDefinition>,
    default_index: usize,
}

impl StyleRegistry {
    pub fn new(styles: Vec<StyleDefinition>, default_id: &str) -> Result<Self, CatalogError> {
        if styles.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for style in &styles {
            if !seen.insert(style.id.to_ascii_lowercase()) {
                return Err(CatalogError::DuplicateId(style.id.clone()));
            }
        }
        let default_index = styles
            .iter()
            .position(|style| style.id.eq_ignore_ascii_case(default_id))
            .ok_or_else(|| CatalogError::UnknownDefault(default_id.to_string()))?;
        Ok(Self {
            styles,
            default_index,
        })
    }

    pub fn builtin() -> Self {
        Self {
            default_index: 1,
            styles: builtin_styles(),
        }
    }

    pub fn from_yaml_str(text: &str, default_id: &str) -> Result<Self, CatalogError> {
        let file: StyleCatalogFile = serde_yaml::from_str(text)?;
        let default_id = file.default.as_deref().unwrap_or(default_id);
        Self::new(file.styles, default_id)
    }

    /// Loads the catalog from `path` when given, otherwise the built-in set.
    pub fn load(path: Option<&Path>, default_id: &str) -> Result<Self, CatalogError> {
        let Some(path) = path else {
            let registry = Self::builtin();
            if registry.lookup(default_id).is_none() {
                return Err(CatalogError::UnknownDefault(default_id.to_string()));
            }
            return Self::new(registry.styles, default_id);
        };
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_yaml_str(&text, default_id)?;
        info!(
            "Loaded {} style(s) from {}",
            registry.styles.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn lookup(&self, id: &str) -> Option<&StyleDefinition> {
        let id = id.trim();
        self.styles
            .iter()
            .find(|style| style.id.eq_ignore_ascii_case(id))
    }

    pub fn get(&self, id: &str) -> &StyleDefinition {
        match self.lookup(id) {
            Some(style) => style,
            None => {
                warn!(
                    "Unknown style id '{}', falling back to '{}'",
                    id,
                    self.default_style().id
                );
                self.default_style()
            }
        }
    }

    pub fn default_style(&self) -> &StyleDefinition {
        &self.styles[self.default_index]
    }

    pub fn list(&self) -> &[StyleDefinition] {
        &self.styles
    }
}

fn outfit(id: &str, name: &str, name_en: &str, description: &str, color: &str) -> OutfitSpec {
    OutfitSpec {
        id: id.to_string(),
        name: name.to_string(),
        name_en: name_en.to_string(),
        description: description.to_string(),
        color: color.to_string(),
    }
}

fn sentences(lines: &[&str]) -> String {
    lines.join(" ")
}

const SHARED_RULES: [&str; 6] = [
    "Use clean, closed, uniform-weight contour lines optimized for print at 300dpi",
    "No overhanging sleeves or clipped limbs: every body part must be fully enclosed",
    "Leave at least 5mm white margin around the full body on all sides",
    "Front-facing base doll with stable symmetric stance, weight evenly distributed",
    "Bottom outfits must be separate detachable overlay pieces with visible dashed cut lines",
    "Zero perspective distortion: strict orthographic front projection",
];

const SHARED_RULES_KR: [&str; 6] = [
    "300dpi 인쇄 최적화된 균일한 외곽선 사용",
    "잘리거나 넘치는 부분 없이 모든 신체 부위를 완전히 둘러쌈",
    "전신 주변 최소 5mm 여백 확보",
    "정면 대칭 자세, 무게 균등 배분",
    "하단 의상은 분리 가능한 오버레이 조각 + 절취선 표시",
    "원근 왜곡 없음, 정면 직교 투영만 사용",
];

fn rules(specific: &[&str]) -> Vec<String> {
    SHARED_RULES
        .iter()
        .chain(specific.iter())
        .map(|rule| rule.to_string())
        .collect()
}

fn rules_kr(specific: &[&str]) -> Vec<String> {
    SHARED_RULES_KR
        .iter()
        .chain(specific.iter())
        .map(|rule| rule.to_string())
        .collect()
}

const SIMPLE_SHAPE: &str =
    "full body, centered, front-facing, arms slightly apart, shoulders and hips in balanced angle";
const SIMPLE_SIZE: &str = "fits within A4 character area about 15cm tall";
const SIMPLE_CLOTHING: &str = "base outfit is a clean neutral top + shorts in solid lines";
const SIMPLE_FACE: &str =
    "clear jawline, clean eyes, small nose, neutral mouth, clear hairline";

fn builtin_styles() -> Vec<StyleDefinition> {
    vec![
        StyleDefinition {
            id: "sd".to_string(),
            name: "SD 귀여운".to_string(),
            ratio: "3-head-tall".to_string(),
            ratio_display: "약 3등신".to_string(),
            desc: "Chibi/SD paper-doll base derived from Simple Line frame".to_string(),
            desc_kr: "심플라인 기반의 치비/SD 종이인형. 머리 비율만 확대, 몸체 실루엣은 유지.".to_string(),
            tone: sentences(&[
                "Super-deformed (SD) chibi kawaii illustration for paper doll.",
                "3-head-tall proportion: head = 40% of total height.",
                "Head is perfectly round with oversized cranium dome.",
                "Eyes are 30% of face area: large, round, with double-ring iris highlights and thick upper lash line.",
                "Cheeks have visible soft blush circles.",
                "Nose is a single tiny dot or absent; mouth is a small curve.",
                "Body is compact and stubby: short torso, short limbs, no visible joints.",
                "Hands are simplified mitten shapes with 3-4 finger bumps.",
                "Feet are small rounded stumps.",
                "Line weight: 2px main contour, 1px inner detail.",
                "All edges are rounded, no sharp corners anywhere on the character.",
                "Rendering: flat cel-shaded fills, no gradient, no texture.",
            ]),
            tone_kr: "초대형 동그란 머리(전체 40%), 큰 반짝이 눈, 볼 터치, 짧은 팔다리, 뭉툭한 손발, 모든 모서리 둥글게, 플랫 셀셰이딩".to_string(),
            outfits: [
                outfit("spring", "봄나들이", "Spring Outing", "floral print mini dress with 5+ distinct flower shapes, sun hat with wide brim and ribbon bow, mary-jane shoes with buckle, patterned ankle socks with lace trim", "soft pastel pink dress with yellow/white florals, straw-colored hat with pink ribbon"),
                outfit("ballet", "발레리나", "Ballerina", "multi-layered tutu with 4+ visible tulle layers, fitted bodice with cross-lace detail, satin ribbon sash at waist, pointe shoes with criss-cross ankle ribbons, crystal tiara", "ballet pink and white with iridescent sparkle accents"),
                outfit("hanbok", "한복", "Hanbok", "jeogori with goreum ribbon tie and floral embroidery on sleeve cuffs, full chima with 3 visible fabric fold layers, decorative norigae pendant hanging from goreum, traditional kkotsin shoes with upturned toe", "crimson red jeogori with gold embroidery, deep indigo chima, multicolor norigae"),
                outfit("pajama", "파자마", "Pajamas", "button-front pajama top with star and crescent moon repeat pattern, matching pants with elastic cuffs, bunny-face slippers with floppy ears, sleep mask with bear face pushed up on forehead", "lavender top and mint pants with golden yellow stars, white bunny slippers with pink inner ear"),
            ],
            strict_rules: rules(&[
                "Head circumference must be visibly larger than shoulder width",
                "No neck visible: head sits directly on torso",
                "Limb length must not exceed 1.2x torso length",
                "All corners and joints must be rounded (border-radius effect)",
            ]),
            strict_rules_kr: rules_kr(&[
                "머리 둘레 > 어깨 너비 (필수)",
                "목 없음, 머리가 몸통에 바로 연결",
                "팔다리 길이 ≤ 몸통 1.2배",
                "모든 꼭짓점/관절 라운드 처리",
            ]),
            base_template: Some(format!(
                "Use Simple Line composition ({SIMPLE_SHAPE}, {SIMPLE_SIZE}) but apply SD head-to-body ratio of 1:2."
            )),
            line_art_structure: "oversized round head, stubby rounded limbs and blush circles drawn as outlines".to_string(),
        },
        StyleDefinition {
            id: "simple".to_string(),
            name: "심플라인".to_string(),
            ratio: "4-head-tall".to_string(),
            ratio_display: "4등신".to_string(),
            desc: "Simple Line, the base template all other styles derive from".to_string(),
            desc_kr: "모든 스타일의 기준이 되는 베이스 템플릿. 안정적이고 정돈된 실루엣.".to_string(),
            tone: sentences(&[
                "Clean cute illustration for paper doll, serving as the master base template.",
                "4-head-tall proportion with balanced anatomy.",
                "Head is slightly large but natural, oval-shaped with clean jawline.",
                "Eyes are medium-large with clear iris detail, single highlight dot, visible eyelashes.",
                "Nose is a small soft triangle; mouth is a gentle smile line.",
                "Body has clear shoulder-waist-hip definition without exaggeration.",
                "Arms hang naturally with slight bend, hands have 5 defined fingers.",
                "Legs are straight and balanced, feet are simple flat shapes.",
                "Line weight: 2.5px main contour, 1.5px inner detail, 0.5px fabric texture hints.",
                "Style is between cartoon and illustration: readable but not overly simplified.",
                "Rendering: clean flat color with minimal single-direction shadow on one side.",
            ]),
            tone_kr: "4등신 기본 비율, 자연스러운 타원 얼굴, 깨끗한 윤곽선, 어깨-허리-힙 비율 명확, 최소한의 단방향 그림자".to_string(),
            outfits: [
                outfit("casual", "캐주얼", "Casual", "denim overall dress with visible stitching and brass button detail, striped tee underneath (red/white 1cm stripes), canvas sneakers with rubber sole and star patch, mini backpack with zipper pull", "classic blue denim overall, red/white striped tee, white sneakers with gold star"),
                outfit("princess", "공주님", "Princess", "ball gown with off-shoulder puff sleeves, layered skirt with 3 visible tiers, sparkle detail scattered on fabric, jeweled tiara with center gem, star-tipped wand, glass-like transparent heels", "magenta-to-pink gradient gown, silver tiara with blue center gem, gold wand"),
                outfit("hanbok", "한복", "Hanbok", "jeogori with curved neckline and goreum bow, embroidered trim along sleeve edges, full chima with visible waistband sash, traditional binyeo hairpin with jade ornament, embroidered floral flat shoes", "coral pink jeogori with gold trim, indigo chima, jade green binyeo accent"),
                outfit("adventure", "탐험가", "Explorer", "multi-pocket safari vest with cargo flaps, canvas cargo shorts with side pockets, lace-up hiking boots with thick sole, wide-brim adventure hat with cord, binoculars on neck strap as detachable accessory", "olive khaki vest, tan shorts, brown leather boots, forest green hat"),
            ],
            strict_rules: rules(&[
                "This is the canonical base: all extracted features (hair, face, glasses, accessories) must be rendered with maximum fidelity",
                "Proportions must be anatomically balanced: shoulder width = 1.5 head widths, arm length = 1.8 head heights",
                "Every outfit piece must have at least one distinguishing texture or pattern detail",
            ]),
            strict_rules_kr: rules_kr(&[
                "기준 템플릿, 추출된 모든 특징을 최대한 충실히 반영",
                "어깨 너비 = 머리 1.5배, 팔 길이 = 머리 높이 1.8배",
                "모든 의상에 최소 1개 이상의 텍스처/패턴 디테일 필수",
            ]),
            base_template: Some(format!(
                "Canonical base: {SIMPLE_SHAPE}, {SIMPLE_SIZE}, {SIMPLE_CLOTHING}, {SIMPLE_FACE}."
            )),
            line_art_structure: "balanced 4-head anatomy, clean closed contours and texture hints as thin lines".to_string(),
        },
        StyleDefinition {
            id: "fashion".to_string(),
            name: "패션 일러스트".to_string(),
            ratio: "5.5-head-tall".to_string(),
            ratio_display: "5.5등신".to_string(),
            desc: "Fashion illustration upgrade from Simple Line with refined proportions".to_string(),
            desc_kr: "심플라인에서 비율을 한 단계 키우고 의상 디테일(주름/봉제선/드레이프)을 보강한 패션 일러스트.".to_string(),
            tone: sentences(&[
                "Elegant fashion illustration for paper doll, derived from Simple Line base.",
                "5.5-head-tall proportion: elongated legs (+30% vs base), slim torso, graceful neck visible.",
                "FACE IS CRITICAL: The face must look ATTRACTIVE and AGE-APPROPRIATE. Reproduce the extracted face features faithfully.",
                "Do NOT distort the face for fashion effect; keep it cute/pretty and matching the original age.",
                "Eyes have fashion-illustration styling: slightly almond shape, defined brow arch, clean lash detail, but still friendly and appealing.",
                "Body has clear S-curve posture hint while maintaining front-facing stance.",
                "Fabric rendering is key differentiator: visible seam lines, pleat shadows, drape fold physics.",
                "Each garment shows construction detail: buttons, zippers, stitching, lining peeks.",
                "Accessories have material distinction: leather vs metal vs fabric vs crystal.",
                "Line weight: 2px main contour, 1px garment construction lines, 0.5px fabric texture.",
                "Rendering: clean line art with selective thin-line cross-hatching for fabric weight areas.",
            ]),
            tone_kr: "5.5등신 늘씬한 비율, 아몬드형 눈, S커브 자세, 봉제선/주름/드레이프 물리 표현, 소재별 질감 구분".to_string(),
            outfits: [
                outfit("casual", "캐주얼", "Casual", "cropped boucle cardigan with pearl button closure, knife-pleated midi skirt with visible waistband, platform sneakers with chunky sole detail, quilted crossbody bag with chain strap", "cream boucle cardigan, dusty rose skirt, white/gold sneakers, tan bag with gold chain"),
                outfit("princess", "공주님", "Princess", "A-line gown with French lace overlay on bodice, off-shoulder neckline with scalloped edge, multi-layer tulle skirt with horsehair hem, opera-length satin gloves, crystal-encrusted stiletto heels, filigree tiara", "champagne gold gown, ivory lace overlay, silver crystal heels, pearl white gloves"),
                outfit("hanbok", "한복", "Hanbok", "modernized short jeogori with structured shoulder line, slim goreum with contemporary knot, flowing chima with knife pleats and modern hem length, traditional gold-thread embroidery along edges, sleek traditional hairpin", "sage green jeogori, dusty pink chima, gold thread embroidery, antique jade pin"),
                outfit("explorer", "탐험가", "Explorer", "tailored utility jacket with epaulettes and cargo pockets, slim-fit cargo pants with ankle zipper, lace-up cognac leather boots with heel, canvas bucket hat, vintage leather camera with strap", "olive jacket, beige cargo pants, cognac brown leather boots, tan hat, brown camera"),
            ],
            strict_rules: rules(&[
                "Leg length must be at least 55% of total body height",
                "Every garment must show at least 2 construction details (seams, buttons, pleats, zippers)",
                "Fabric weight must be visually distinguishable: heavy fabrics drape down, light fabrics float",
                "Character identity (face/hair) must remain clearly identical to base; only proportions change",
            ]),
            strict_rules_kr: rules_kr(&[
                "다리 길이 ≥ 전체 신장의 55%",
                "모든 의상에 봉제 디테일 2개 이상 (솔기/단추/주름/지퍼)",
                "원단 무게감 시각 구분: 무거운 원단은 아래로, 가벼운 원단은 부풀어오르게",
                "얼굴/헤어는 베이스와 동일, 비율만 변경",
            ]),
            base_template: Some(format!(
                "Derived from Simple Line: {SIMPLE_SHAPE}, {SIMPLE_SIZE}, {SIMPLE_FACE}. Upgrade: elongate legs, add garment construction detail, refine fabric rendering."
            )),
            line_art_structure: "elongated legs, seams, pleats and drape folds kept as construction lines".to_string(),
        },
        StyleDefinition {
            id: "pastel".to_string(),
            name: "파스텔 드림".to_string(),
            ratio: "3.5-head-tall".to_string(),
            ratio_display: "3.5등신".to_string(),
            desc: "Dreamy pastel watercolor-feel illustration with soft-focus aesthetic".to_string(),
            desc_kr: "수채화 느낌의 부드러운 파스텔톤. 선이 연하고 색 경계가 흐릿하며 몽환적인 분위기.".to_string(),
            tone: sentences(&[
                "CRITICAL STYLE DIRECTIVE: This must look distinctly different from all other styles.",
                "Dreamy soft pastel watercolor illustration style for paper doll.",
                "3.5-head-tall proportion with rounded, puffy body silhouette.",
                "ALL lines must be soft-edged and slightly blurred, NOT crisp black lines.",
                "Line color is NEVER black: use warm gray (#B0A8A0) or soft mauve (#C4A6B8) for all outlines.",
                "Line weight: 1.5px with soft anti-aliased edges that bleed slightly into surrounding color.",
                "Eyes are large with PASTEL-colored irises (lavender, mint, peach) and soft gradient fill.",
                "Cheeks have large circular watercolor-style blush patches that fade at edges.",
                "Hair is rendered in soft gradient blocks, not individual strands, like watercolor washes.",
                "ALL colors must be desaturated pastels: max saturation 40%, lightness 75-90%.",
                "Color palette restricted to: baby pink, lavender, mint, cream, peach, powder blue, soft coral.",
                "Background color hints: subtle pastel wash bleeding from character edges (NOT pure white).",
                "Texture: visible paper grain effect or watercolor bloom texture on all colored areas.",
                "Overall mood: like a page from a dreamy children's picture book, soft-focus camera effect.",
            ]),
            tone_kr: "수채화 번짐 효과, 선 색상은 절대 검정 아님(회갈색/모브), 부드러운 안티앨리어싱, 파스텔 아이리스 눈, 수채 블러시, 채도 40% 이하, 종이 질감 표현".to_string(),
            outfits: [
                outfit("icecream", "아이스크림", "Ice Cream", "mint pinafore dress with scalloped hem and ice-cream cone embroidery, candy-striped knee socks, pastel sneakers with heart laces, candy-shaped hair clip with wrapped ribbon", "mint green dress with peach/cream stripes, strawberry pink socks, lavender sneakers"),
                outfit("library", "도서관", "Library", "oversized cable-knit cardigan with wooden toggle buttons, pleated school skirt with soft plaid, canvas tote bag with book peeking out, mary-jane shoes", "cream cardigan, light blue plaid skirt, warm beige tote, powder pink shoes"),
                outfit("kpop", "꽃소녀", "Flower Girl", "pastel hanbok-inspired one-piece with shortened chima, wide ribbon sash with butterfly bow, traditional-modern fusion shoes, flower crown headband with soft trailing ribbons", "baby pink dress with peach sash, cream shoes, lavender and pink flower crown"),
                outfit("skate", "스케이트", "Roller Skate", "soft velour tracksuit jacket with zipper, matching shorts with pastel piping, knee-high socks with star pattern, quad roller skates with pastel wheels, wrist guards with heart detail", "powder blue jacket, salmon shorts, cream socks with pink stars, lilac skates"),
            ],
            strict_rules: rules(&[
                "MANDATORY: Line color must be warm gray or mauve, NEVER pure black (#000000)",
                "MANDATORY: All fills use pastel colors with max 40% saturation",
                "MANDATORY: Add visible watercolor bloom/bleed texture effect on at least 3 areas",
                "All corners must be extra-rounded (minimum 8px radius equivalent)",
                "Hair must be rendered as soft gradient color blocks, not individual strands",
                "Blush must be visible circular watercolor patches on both cheeks",
            ]),
            strict_rules_kr: rules_kr(&[
                "필수: 선 색상은 웜그레이 또는 모브, 순흑(#000) 절대 금지",
                "필수: 모든 채색은 채도 40% 이하 파스텔",
                "필수: 수채화 번짐(블룸) 효과 3곳 이상",
                "모든 모서리 초둥글게(8px 이상)",
                "머리카락은 그라데이션 블록으로 (개별 가닥 아님)",
                "양볼에 수채 블러시 패치 필수",
            ]),
            base_template: None,
            line_art_structure: "soft rounded puffy silhouette, extra-rounded corners and block-shaped hair masses".to_string(),
        },
        StyleDefinition {
            id: "inkline".to_string(),
            name: "모노 라인".to_string(),
            ratio: "4-head-tall".to_string(),
            ratio_display: "4등신".to_string(),
            desc: "Monochrome ink illustration with line hierarchy and crosshatch shading".to_string(),
            desc_kr: "잉크 펜 드로잉 느낌. 선 굵기에 위계가 있고, 크로스해칭으로 음영 표현. 색 최소화.".to_string(),
            tone: sentences(&[
                "Professional monochrome ink illustration style for paper doll.",
                "4-head-tall proportion with clean structural anatomy.",
                "THREE distinct line weights creating visual hierarchy:",
                "3px bold contour for body silhouette and garment edges,",
                "1.5px medium line for internal structure (collar, cuffs, pockets, seams),",
                "0.5px fine line for texture detail (fabric weave, hair strands, pattern fills).",
                "Shading ONLY through crosshatch technique: parallel line groups at 45 degree angles.",
                "NO solid black fills larger than 5mm², use hatching density to imply darkness.",
                "Eyes are rendered with fine detail: iris has radial lines, pupil is solid black circle.",
                "Hair uses flowing parallel stroke groups with varied spacing for volume.",
                "Fabric texture is style-critical: each material must have distinct hatching pattern.",
                "NO color, NO gray tone, NO gradient: pure black ink lines on white only.",
                "Aesthetic reference: European fashion plate engraving meets manga pen technique.",
            ]),
            tone_kr: "3단계 선 굵기(3px/1.5px/0.5px) 위계, 크로스해칭 음영(45°), 5mm² 이상 검정 채우기 금지, 소재별 해칭 패턴 구분, 순수 흑백".to_string(),
            outfits: [
                outfit("office", "오피스", "Office", "structured blazer with notched lapel and visible stitching, pencil skirt with kick pleat, penny loafers with tassel detail, structured leather handbag with clasp", "charcoal gray blazer, black skirt, oxblood loafers, navy bag"),
                outfit("nun", "수녀", "Convent", "modest high-collar dress with pin-tuck bodice, wide ribbon sash at waist, delicate cross pendant necklace, wrist-length gloves with button closure", "navy dress, ivory sash, silver pendant, cream gloves"),
                outfit("hanbok", "한복", "Hanbok", "traditional hanbok with geometric fold patterns on chima, structured jeogori with sharp collar lines, ornamental binyeo with fan-shaped head, traditional shoes with upturned toe", "maroon jeogori, black chima with jade-colored geometric trim"),
                outfit("urban", "트랜지션", "Urban", "oversized hoodie with kangaroo pocket and drawstring detail, cargo shorts with flap pockets and snap buttons, high-top sneakers with visible lacing pattern, fingerless utility gloves", "charcoal hoodie, dark gray shorts, black sneakers with cyan sole accent"),
            ],
            strict_rules: rules(&[
                "MANDATORY: Three distinct line weights must be clearly visible (3px / 1.5px / 0.5px)",
                "MANDATORY: Shading uses crosshatch lines only, no solid fills, no gradients",
                "Each fabric type must have a unique hatching pattern (tweed, silk, leather and cotton all differ)",
                "Hair must show parallel flowing strokes with deliberate spacing variation",
            ]),
            strict_rules_kr: rules_kr(&[
                "필수: 선 굵기 3단계가 명확히 구분되어야 함",
                "필수: 음영은 크로스해칭만, 채우기/그라데이션 금지",
                "각 소재별 고유 해칭 패턴 (트위드 ≠ 실크 ≠ 가죽 ≠ 면)",
                "머리카락은 간격 변화가 있는 흐르는 평행 스트로크",
            ]),
            base_template: None,
            line_art_structure: "three-level line weight hierarchy; crosshatching becomes light open hatching that leaves areas colorable".to_string(),
        },
        StyleDefinition {
            id: "pastelpixel".to_string(),
            name: "픽셀 키키".to_string(),
            ratio: "4-head-tall".to_string(),
            ratio_display: "4등신".to_string(),
            desc: "Retro pixel-art inspired illustration with visible grid structure".to_string(),
            desc_kr: "레트로 픽셀아트 감성. 눈에 보이는 픽셀 격자, 계단 현상(앨리어싱) 의도적 노출, 네온 악센트 컬러.".to_string(),
            tone: sentences(&[
                "CRITICAL STYLE DIRECTIVE: This must look like pixel art / retro game sprite, NOT normal illustration.",
                "Retro pixel-art inspired character for paper doll.",
                "4-head-tall proportion rendered AS IF on a 128x256 pixel grid.",
                "ALL edges must show visible pixel stepping (staircase aliasing); this is the core visual identity.",
                "NO smooth curves: every curve must be approximated with pixel-grid stair steps.",
                "Eyes are 8x8 pixel blocks with 2x2 white highlight square in upper-left.",
                "Hair is rendered as chunky pixel blocks grouped by color, no individual strands.",
                "Body contour uses 2-pixel-wide black border with consistent pixel stepping.",
                "Internal details (face, clothes) use 1-pixel lines.",
                "When in COLOR mode: fills are perfectly flat, ZERO gradient, ZERO anti-aliasing. Palette limited to 16 colors max.",
                "When in LINE ART / COLORING BOOK mode: ALL pixels must be black or white ONLY. No color fills. Pixel grid structure and staircase edges remain visible. Areas meant for coloring are enclosed by black pixel OUTLINE borders with EMPTY WHITE interior.",
                "LINE ART CRITICAL: In coloring book mode, garment interiors must be WHITE/EMPTY; do NOT fill clothing areas with dense black pixels, checkerboard, or dither patterns. Only draw the OUTLINE edges of each garment piece.",
                "Accessories rendered as recognizable pixel icons (8x8 to 16x16 pixel resolution feel).",
                "Overall aesthetic: Game Boy Advance / SNES RPG character sprite enlarged to paper doll size.",
            ]),
            tone_kr: "128×256 픽셀 격자 느낌, 모든 곡선은 계단 현상(스텝) 표현, 8×8 블록 눈, 16색 제한, 완전 플랫 채색, GBA/SNES 스프라이트 레퍼런스".to_string(),
            outfits: [
                outfit("game", "게임존", "Game Zone", "neon-trimmed bomber jacket with pixel-pattern patches, mini skirt with dithered gradient edge, platform sneakers with chunky pixel sole, joystick-shaped keyring accessory as detachable piece", "electric violet jacket with cyan trim, hot pink skirt, white sneakers with neon green sole"),
                outfit("space", "우주", "Space", "retro space suit with segmented pixel armor panels, emblem patches on shoulders (8-bit star design), glossy boots with pixel reflection squares, helmet accessory (separate piece) with tinted visor", "navy suit with silver pixel armor, lime green emblem patches, chrome boots"),
                outfit("hanbok", "퓨전한복", "Fusion Hanbok", "modernized hanbok rendered in pixel blocks, geometric pixel-pattern ribbon bow, angular chima with pixel-dithered gradient edge, pixel-art traditional shoes, glitch-art inspired hair ornament", "turquoise jeogori with magenta pixel border, gold dithered chima edge"),
                outfit("street", "스트리트", "Street", "oversized pixel-art hoodie with 8-bit face graphic on front, cargo shorts with pixel camo pattern, chunky sneakers with visible pixel grid on sole, pixel-art wristband accessories", "black hoodie with white 8-bit graphic, white shorts with yellow pixel camo, electric yellow sneakers"),
            ],
            strict_rules: rules(&[
                "MANDATORY: All curves must show visible pixel staircase stepping, zero anti-aliasing on character edges",
                "MANDATORY: Color fills must be perfectly flat with zero gradient; use dithering patterns for tone variation",
                "MANDATORY: Maximum 16 distinct colors in entire illustration",
                "Eyes must be rendered as pixel blocks (not smooth circles)",
                "At least 3 garment areas must show pixel-grid texture patterns (checkerboard, diagonal, stripe)",
                "Overall image must read as \"enlarged pixel sprite\" not \"normal illustration\"",
            ]),
            strict_rules_kr: rules_kr(&[
                "필수: 모든 곡선에 계단 현상(픽셀 스텝) 표현, 안티앨리어싱 0",
                "필수: 완전 플랫 채색, 그라데이션 대신 디더링 패턴 사용",
                "필수: 전체 이미지에 최대 16색",
                "눈은 픽셀 블록으로 (부드러운 원 아님)",
                "3곳 이상 픽셀 격자 텍스처 패턴 사용",
                "\"확대된 픽셀 스프라이트\"로 보여야 함",
            ]),
            base_template: None,
            line_art_structure: "visible pixel grid and staircase edges on every outline, garment interiors left empty white".to_string(),
        },
        StyleDefinition {
            id: "noir".to_string(),
            name: "네오 누아르".to_string(),
            ratio: "5-head-tall".to_string(),
            ratio_display: "5등신".to_string(),
            desc: "Neo-noir cinematic illustration with dramatic contrast and sharp silhouette".to_string(),
            desc_kr: "영화적 누아르 무드. 강한 명암 대비, 날카로운 실루엣, 하드보일드 그림자 처리.".to_string(),
            tone: sentences(&[
                "CRITICAL STYLE DIRECTIVE: This must evoke film-noir / gothic fashion plate aesthetics.",
                "Neo-noir cinematic illustration for paper doll.",
                "5-head-tall proportion with elongated, angular silhouette.",
                "Body shape is lean and angular: sharp shoulder points, defined waist, tapered limbs.",
                "Face has dramatic features: strong jawline, high cheekbones, deep-set eyes with heavy shadow.",
                "Eyes have heavy upper lid shadow creating hooded mysterious look, small sharp highlight.",
                "Hair is rendered in large dramatic swooping shapes with high-contrast light/dark sections.",
                "DRAMATIC LIGHTING is the key differentiator:",
                "strong single-source directional light from upper-left,",
                "cast shadows are hard-edged and angular (not soft/diffused),",
                "shadow areas use dense parallel hatching at 30 degree angle,",
                "lit areas are clean white with minimal detail.",
                "Line weight has extreme contrast: 4px for shadow-side contour, 1px for light-side contour.",
                "Large areas of solid black allowed for dramatic effect (unlike other styles).",
                "Mood: mysterious, sophisticated, cinematic, like a movie poster in paper doll form.",
                "Color phase note: use deep jewel tones only, no pastels, no bright primaries.",
            ]),
            tone_kr: "날카로운 각진 실루엣, 강한 단일 광원(좌상단), 하드엣지 캐스트 섀도우, 30° 해칭 음영, 선 굵기 극단 대비(4px/1px), 대면적 검정 허용, 주얼톤만 사용".to_string(),
            outfits: [
                outfit("midnight", "심야", "Midnight", "floor-length trench coat with dramatic collar pop and belt cinch, ankle boots with pointed toe and stiletto heel, wide-brim fedora hat casting shadow over eyes, the coat interior lining visible at hem", "jet black coat with deep charcoal lining, crimson red belt, black boots"),
                outfit("ghost", "밤도깨비", "Night Goblin", "flowing hooded cloak with jagged hem edge, layered asymmetric skirt with torn-edge detail, ornate lantern accessory on chain (detachable), ribbon tie closures with trailing ends", "deep midnight purple cloak, black skirt, antique gold lantern, silver ribbons"),
                outfit("hanbok", "한복", "Hanbok", "dark dramatic hanbok with extra-long flowing chima train, structured jeogori with sharp geometric collar, ornate silver filigree norigae, modern angular interpretation of traditional shoes", "indigo-black chima, charcoal jeogori with silver thread, oxidized silver norigae"),
                outfit("detective", "현대탐정", "Detective", "belted detective trench coat with epaulettes, leather gloves with visible stitching, deerstalker-inspired hat with modern edge, magnifying glass accessory (detachable), structured messenger bag", "olive drab coat, black leather gloves, sepia brown hat, brass magnifier, dark brown bag"),
            ],
            strict_rules: rules(&[
                "MANDATORY: Single directional light source from upper-left must be evident in all shadow placement",
                "MANDATORY: Shadow-side line weight must be at least 2x thicker than light-side line weight",
                "MANDATORY: At least 20% of character area should be solid black or dense hatching",
                "All shadows must have hard edges, no soft gradients or blurred shadows",
                "Silhouette must be angular and dramatic; avoid rounded cute aesthetics",
            ]),
            strict_rules_kr: rules_kr(&[
                "필수: 좌상단 단일 광원이 모든 그림자 배치에 반영",
                "필수: 그림자 쪽 선 굵기 ≥ 밝은 쪽의 2배",
                "필수: 캐릭터 면적의 20% 이상이 검정 또는 밀집 해칭",
                "모든 그림자는 하드 엣지, 소프트/블러 금지",
                "실루엣은 각지고 드라마틱하게, 귀여운 둥근 느낌 배제",
            ]),
            base_template: None,
            line_art_structure: "angular silhouette, thick shadow-side contours and hard-edged shadow shapes drawn as outlined regions".to_string(),
        },
        StyleDefinition {
            id: "kawaiimax".to_string(),
            name: "케이퍼 키치".to_string(),
            ratio: "2.2-head-tall".to_string(),
            ratio_display: "2.2등신".to_string(),
            desc: "Ultra-kawaii chibi with maximum decoration and sticker-like rendering".to_string(),
            desc_kr: "초극단 카와이 치비. 머리가 몸의 2배, 데코 요소 최대치, 스티커처럼 두꺼운 테두리.".to_string(),
            tone: sentences(&[
                "CRITICAL STYLE DIRECTIVE: This is the most extreme cute style; push kawaii to maximum.",
                "Ultra-kawaii chibi sticker-art for paper doll.",
                "2.2-head-tall proportion: head is LARGER than entire body (head = 55% of total height).",
                "Head shape is a perfect circle, no chin point, no jaw angle.",
                "Eyes occupy 50%+ of face: enormous circular eyes with",
                "3+ concentric highlight rings (large white, medium sparkle, small star),",
                "colored iris filling the entire eye socket,",
                "thick 3px upper lash line with individual lash spikes,",
                "visible star/heart shaped catch-light reflections.",
                "Mouth is a tiny \"w\" or cat-mouth shape, always in smile.",
                "Blush is TWO large pink circles per cheek (stacked or overlapping).",
                "Hair is rendered as a massive voluminous shape: bigger than head, with decorative elements embedded (stars, hearts, bows).",
                "Body is a tiny bean shape below head: no visible neck, no waist, limbs are short stumps.",
                "Hands are ball shapes with no fingers. Feet are tiny round nubs.",
                "OUTLINE: 3.5px thick solid black outline around EVERYTHING, sticker die-cut effect.",
                "An additional 1px white gap between character and outer outline (kiss-cut sticker look).",
                "Decorative elements MANDATORY: floating hearts, stars, sparkles around character (at least 5).",
                "Colors: maximum saturation, candy-bright, with at least 2 glitter/sparkle effects.",
            ]),
            tone_kr: "머리 = 전체 55%, 완벽한 원형, 눈이 얼굴 50% 차지, 3중 하이라이트, 고양이 입, 이중 볼터치, 머리카락에 장식 내장, 콩 모양 몸통, 3.5px 스티커 테두리, 떠다니는 하트/별 5개+, 캔디 색상".to_string(),
            outfits: [
                outfit("dessert", "디저트", "Dessert", "waffle-textured jumper dress with syrup-drip hem, whipped-cream shaped beret, candy cane striped knee socks, heart-shaped buckle mary-janes, ice cream cone bag accessory", "cherry pink dress with cream waffle texture, brown syrup drip, white beret, pink/white striped socks"),
                outfit("star", "별이", "Star", "oversized star-print hoodie with shooting-star zipper pull, tutu skirt made of layered star-shaped fabric, star-patterned tights, glitter platform sneakers, star wand accessory", "cobalt blue hoodie with bright yellow stars, pink tutu, silver glitter shoes"),
                outfit("hanbok", "한복", "Hanbok", "ultra-chibi hanbok with exaggerated puff sleeves, oversized goreum bow (bigger than torso), layered chima with heart-shaped hem cutouts, pom-pom ornament norigae, tiny traditional shoes with star buckle", "ruby pink jeogori, peach chima with gold heart cutout edges, rainbow pom-pom norigae"),
                outfit("rainbow", "레인보우", "Rainbow", "cropped rainbow-stripe bomber jacket with cloud-shaped buttons, rainbow-gradient skort, striped thigh-high socks with star tops, platform sneakers with rainbow soles, rainbow headband with unicorn horn", "full rainbow gradient on all pieces, white cloud buttons, iridescent unicorn horn"),
            ],
            strict_rules: rules(&[
                "MANDATORY: Head must be at least 55% of total character height",
                "MANDATORY: Eyes must occupy at least 50% of face area with 3+ highlight layers",
                "MANDATORY: 3.5px thick sticker-style outline around entire character",
                "MANDATORY: At least 5 floating decorative elements (hearts, stars, sparkles) around character",
                "No visible neck, wrist, or ankle joints; all connections are smooth curves",
                "Every outfit piece must include at least one kawaii motif (heart, star, bow, paw, cloud)",
            ]),
            strict_rules_kr: rules_kr(&[
                "필수: 머리 ≥ 전체 높이의 55%",
                "필수: 눈 ≥ 얼굴 면적의 50%, 하이라이트 3겹 이상",
                "필수: 3.5px 두께 스티커식 외곽선",
                "필수: 떠다니는 장식(하트/별/반짝이) 5개 이상",
                "목/손목/발목 관절 없음, 모든 연결부 부드러운 곡선",
                "모든 의상에 카와이 모티브(하트/별/리본/구름) 1개+",
            ]),
            base_template: None,
            line_art_structure: "huge circular head, bean body, thick sticker outline and floating hearts/stars kept as outlines".to_string(),
        },
    ]
}
