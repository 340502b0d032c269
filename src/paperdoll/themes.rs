use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::paperdoll::styles::{CatalogError, OutfitSet, OutfitSpec};

/// Outfit bundle that replaces a style's default outfits. The style's tone
/// and proportion rules still apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDefinition {
    pub id: String,
    pub name: String,
    /// What the theme keeps fixed, shown to users and sent with the outfits.
    pub lock_description: String,
    pub outfits: OutfitSet,
}

#[derive(Debug, Deserialize)]
struct ThemeCatalogFile {
    themes: Vec<ThemeDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct ThemeRegistry {
    themes: Vec<ThemeDefinition>,
}

impl ThemeRegistry {
    pub fn new(themes: Vec<ThemeDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for theme in &themes {
            if !seen.insert(theme.id.to_ascii_lowercase()) {
                return Err(CatalogError::DuplicateId(theme.id.clone()));
            }
        }
        Ok(Self { themes })
    }

    pub fn builtin() -> Self {
        Self {
            themes: builtin_themes(),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let file: ThemeCatalogFile = serde_yaml::from_str(text)?;
        Self::new(file.themes)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_yaml_str(&text)?;
        info!(
            "Loaded {} theme(s) from {}",
            registry.themes.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&ThemeDefinition> {
        let id = id.trim();
        self.themes
            .iter()
            .find(|theme| theme.id.eq_ignore_ascii_case(id))
    }

    /// Resolves an optional theme id. Blank ids mean "no theme"; unknown ids
    /// are logged and also mean "no theme", so the style defaults apply.
    pub fn resolve(&self, id: Option<&str>) -> Option<&ThemeDefinition> {
        let id = id.map(str::trim).filter(|id| !id.is_empty())?;
        let theme = self.get(id);
        if theme.is_none() {
            warn!("Unknown theme id '{}', using style outfits", id);
        }
        theme
    }

    pub fn list(&self) -> &[ThemeDefinition] {
        &self.themes
    }
}

fn outfit(index: usize, name: &str, name_en: &str, description: &str, color: &str) -> OutfitSpec {
    OutfitSpec {
        id: format!("look{}", index),
        name: name.to_string(),
        name_en: name_en.to_string(),
        description: description.to_string(),
        color: color.to_string(),
    }
}

fn theme(id: &str, name: &str, lock_description: &str, outfits: OutfitSet) -> ThemeDefinition {
    ThemeDefinition {
        id: id.to_string(),
        name: name.to_string(),
        lock_description: lock_description.to_string(),
        outfits,
    }
}

fn builtin_themes() -> Vec<ThemeDefinition> {
    vec![
        theme(
            "casual",
            "캐주얼",
            "일상복 톤. 과하지 않은 디테일, 동작은 안정적인 정면 자세 유지.",
            [
                outfit(1, "데님 캐주얼", "Denim Casual", "denim overall dress over striped tee, canvas sneakers, mini backpack", "blue denim, red/white stripes, white sneakers"),
                outfit(2, "후디 데일리", "Hoodie Daily", "oversized hoodie with front pocket, jogger pants, chunky sneakers, cap", "heather gray hoodie, black joggers, white sneakers, navy cap"),
                outfit(3, "니트 데이트", "Knit Date", "cable-knit cardigan over floral blouse, pleated mini skirt, loafers, crossbody bag", "cream cardigan, pink floral blouse, navy skirt, brown loafers"),
                outfit(4, "스포츠 믹스", "Sporty Mix", "crop zip-up track jacket, tennis skirt, high-top sneakers, sporty headband", "white jacket with pink stripes, pink skirt, white/pink sneakers"),
            ],
        ),
        theme(
            "princess",
            "공주님",
            "우아한 드레스/티아라/글래스 슈즈 톤. 얼굴형·색감만 유지하고 의상은 화려하게.",
            [
                outfit(1, "로즈 프린세스", "Rose Princess", "layered ball gown with rose embroidery, puff sleeves, crystal tiara, glass heels", "pink-to-magenta gown, silver tiara, crystal heels"),
                outfit(2, "스노우 퀸", "Snow Queen", "icy blue A-line gown with snowflake lace overlay, fur-trimmed cape, ice crystal crown", "ice blue gown, white fur cape, silver crown"),
                outfit(3, "스타 프린세스", "Star Princess", "midnight navy gown with star sequin scatter, moon-shaped clutch, star tiara, satin gloves", "navy gown with gold stars, gold tiara, white gloves"),
                outfit(4, "가든 프린세스", "Garden Princess", "pastel green gown with daisy trim, flower crown, ribbon sash, embroidered flats", "pastel green gown, white/yellow flower crown, cream sash"),
            ],
        ),
        theme(
            "hanbok",
            "한복",
            "전통적인 색감과 매듭, 단추, 매듭끈 디테일 반영.",
            [
                outfit(1, "전통 한복", "Traditional Hanbok", "classic jeogori with goreum tie, full chima with waistband, binyeo hairpin, kkotsin shoes", "coral jeogori, indigo chima, jade binyeo"),
                outfit(2, "생활 한복", "Everyday Hanbok", "modernized short jeogori, contemporary chima with pockets, simple hair ribbon, flat shoes", "sage green jeogori, dusty pink chima, white shoes"),
                outfit(3, "명절 한복", "Holiday Hanbok", "embroidered ceremonial jeogori, layered silk chima, ornate norigae pendant, traditional headpiece", "ruby red jeogori with gold embroidery, deep blue chima"),
                outfit(4, "퓨전 한복", "Fusion Hanbok", "hanbok-inspired one-piece dress, wide modern belt, contemporary shoes, minimalist hairpin", "lavender dress with white belt, cream shoes"),
            ],
        ),
        theme(
            "adventurer",
            "탐험가",
            "베이스는 유지하되 액세서리, 가방, 장비 실루엣 강화.",
            [
                outfit(1, "정글 탐험", "Jungle Explorer", "safari vest with pockets, cargo shorts, hiking boots, wide-brim hat, binoculars", "olive vest, tan shorts, brown boots, khaki hat"),
                outfit(2, "우주 탐험", "Space Explorer", "space suit with patches, glossy boots, helmet accessory, mission badge", "white suit with blue patches, silver boots"),
                outfit(3, "바다 탐험", "Sea Explorer", "striped sailor top, shorts, rain boots, captain hat, telescope accessory", "navy/white stripes, yellow rain boots, white captain hat"),
                outfit(4, "산악 탐험", "Mountain Explorer", "puffer vest, leggings, trail sneakers, beanie, hiking pole accessory", "red puffer, black leggings, gray sneakers, blue beanie"),
            ],
        ),
        theme(
            "ballet",
            "발레리나",
            "소프트한 플레어/리본/포인트 슈즈 중심의 균형 잡힌 우아함.",
            [
                outfit(1, "클래식 발레", "Classic Ballet", "classical tutu with layered tulle, fitted bodice, pointe shoes with ribbons, tiara", "ballet pink tutu, satin pink pointe shoes, silver tiara"),
                outfit(2, "모던 발레", "Modern Ballet", "contemporary leotard with mesh panel, flowing wrap skirt, split-sole shoes, hair ribbon", "dusty rose leotard, white wrap skirt, nude shoes"),
                outfit(3, "백조의 호수", "Swan Lake", "white feathered tutu, crystal bodice, white pointe shoes, swan crown headpiece", "pure white tutu with silver crystals, white shoes, silver crown"),
                outfit(4, "쿠키 발레", "Cookie Ballet", "playful tutu with candy pattern, colorful bodice, decorated pointe shoes, star hairpin", "pastel rainbow tutu, pink bodice, multicolor shoes"),
            ],
        ),
        theme(
            "school",
            "교복",
            "실루엣은 유지하고 단정한 교복 라인 및 모자, 액세서리 정돈.",
            [
                outfit(1, "세일러 교복", "Sailor Uniform", "sailor collar blouse, pleated skirt, knee socks, loafers, school bag", "white blouse with navy collar, navy skirt, white socks"),
                outfit(2, "블레이저 교복", "Blazer Uniform", "school blazer with crest, white shirt, plaid skirt, mary-janes, tie", "navy blazer, white shirt, red plaid skirt, black shoes"),
                outfit(3, "체육복", "Gym Clothes", "school gym t-shirt, track shorts, sneakers, gym bag, headband", "white tee with blue lines, navy shorts, white sneakers"),
                outfit(4, "졸업식", "Graduation", "formal dress shirt, bow tie, cardigan, dress shoes, diploma roll accessory", "white shirt, navy cardigan, black bow tie, black shoes"),
            ],
        ),
        theme(
            "summer",
            "여름 휴가",
            "명쾌한 채색과 라이트한 캐주얼, 햇빛·썬햇 계열 포인트.",
            [
                outfit(1, "비치룩", "Beach Look", "ruffled sundress, straw sun hat, sandals, beach bag, sunglasses accessory", "yellow sundress, straw hat with blue ribbon, tan sandals"),
                outfit(2, "아이스크림", "Ice Cream", "pastel crop top, denim shorts, platform sandals, ice cream cone bag", "mint top, light denim shorts, white sandals, pink bag"),
                outfit(3, "하와이안", "Hawaiian", "tropical print shirt-dress, flower lei, flip-flops, ukulele accessory", "red/green tropical print, pink lei, white flip-flops"),
                outfit(4, "수영복", "Swimsuit", "one-piece swimsuit with star pattern, swim cap, goggles on head, pool float accessory", "sky blue swimsuit with white stars, pink cap, yellow float"),
            ],
        ),
        theme(
            "night",
            "야경/무드",
            "명암은 너무 과하지 않게, 눈/얼굴 식별성을 유지한 채 다크 톤 유지.",
            [
                outfit(1, "문라이트", "Moonlight", "velvet midi dress, sheer shawl, low heels, crescent moon clutch", "deep navy dress, silver shawl, gold crescent clutch"),
                outfit(2, "파자마 파티", "Pajama Party", "star-print pajama set, fluffy slippers, sleep mask on head, pillow accessory", "lavender pajamas with gold stars, white slippers"),
                outfit(3, "할로윈", "Halloween", "witch dress with layered hem, pointed hat, striped socks, broom accessory", "purple/black dress, black hat with orange band, orange/black socks"),
                outfit(4, "크리스마스", "Christmas", "santa-inspired dress with fur trim, boots, santa hat, gift box accessory", "red dress with white fur, black boots, red/white hat"),
            ],
        ),
    ]
}
