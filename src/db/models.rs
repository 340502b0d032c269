use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GenerationRow {
    pub id: i64,
    pub owner: String,
    pub features_summary: String,
    pub style_id: String,
    pub line_art_url: Option<String>,
    pub color_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationRow {
    /// The URL worth showing first: the colored sheet when present.
    pub fn preview_url(&self) -> Option<&str> {
        self.color_url
            .as_deref()
            .or(self.line_art_url.as_deref())
    }
}
