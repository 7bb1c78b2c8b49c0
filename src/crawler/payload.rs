//! Shapes of the `window.__DATA__` object embedded in LibMe pages.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNovelInfo {
    #[serde(default)]
    pub manga: RawManga,
    #[serde(default)]
    pub chapters: RawChapterList,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawManga {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub slug: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub eng_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub rus_name: String,
}

impl RawManga {
    /// English name, then Russian name, then slug.
    pub fn display_name(&self) -> &str {
        [&self.eng_name, &self.rus_name, &self.slug]
            .into_iter()
            .find(|name| !name.trim().is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChapterList {
    #[serde(default)]
    pub list: Vec<RawChapter>,
    #[serde(default)]
    pub branches: Vec<RawBranch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChapter {
    #[serde(default, deserialize_with = "loose_string")]
    pub chapter_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub chapter_number: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub chapter_volume: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub branch_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBranch {
    #[serde(deserialize_with = "loose_string")]
    pub id: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
}

/// Accepts a string, a number, a boolean or null, and yields it as text.
fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}
