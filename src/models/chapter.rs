use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a chapter inside its branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterKey(f64);

impl ChapterKey {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for ChapterKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterKey {}

impl PartialOrd for ChapterKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for ChapterKey {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub name: String,
    /// Chapter number exactly as the source printed it.
    pub number: String,
    pub key: ChapterKey,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: HashMap<String, Vec<u8>>,
}

impl Default for ChapterKey {
    fn default() -> Self {
        Self(0.0)
    }
}

impl Chapter {
    pub fn builder() -> ChapterBuilder {
        ChapterBuilder::new()
    }

    pub fn is_loaded(&self) -> bool {
        !self.content.is_empty()
    }

    /// The chapter name, or a positional label when the source gave none.
    pub fn title(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Chapter {}", self.key)
        } else {
            self.name.clone()
        }
    }
}

pub struct ChapterBuilder {
    chapter: Chapter,
}

impl ChapterBuilder {
    pub fn new() -> Self {
        Self {
            chapter: Chapter::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.chapter.name = name.into();
        self
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.chapter.number = number.into();
        self
    }

    pub fn key(mut self, key: impl Into<ChapterKey>) -> Self {
        self.chapter.key = key.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.chapter.url = url.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.chapter.content = content.into();
        self
    }

    pub fn image(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.chapter.images.insert(name.into(), bytes);
        self
    }

    pub fn build(self) -> Chapter {
        self.chapter
    }
}

impl Default for ChapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chapters of one branch, ordered by key. Every chapter is stored under its own `key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Chapter>", into = "Vec<Chapter>")]
pub struct Chapters(BTreeMap<ChapterKey, Chapter>);

impl Chapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: ChapterKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn get(&self, key: ChapterKey) -> Option<&Chapter> {
        self.0.get(&key)
    }

    pub fn get_mut(&mut self, key: ChapterKey) -> Option<&mut Chapter> {
        self.0.get_mut(&key)
    }

    /// Stores `chapter` under its key, returning any chapter it displaced.
    pub fn insert(&mut self, chapter: Chapter) -> Option<Chapter> {
        self.0.insert(chapter.key, chapter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = ChapterKey> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chapter> {
        self.0.values()
    }
}

impl From<Vec<Chapter>> for Chapters {
    fn from(chapters: Vec<Chapter>) -> Self {
        chapters.into_iter().collect()
    }
}

impl From<Chapters> for Vec<Chapter> {
    fn from(chapters: Chapters) -> Self {
        chapters.0.into_values().collect()
    }
}

impl FromIterator<Chapter> for Chapters {
    fn from_iter<I: IntoIterator<Item = Chapter>>(iter: I) -> Self {
        Self(iter.into_iter().map(|c| (c.key, c)).collect())
    }
}

impl IntoIterator for Chapters {
    type Item = Chapter;
    type IntoIter = std::collections::btree_map::IntoValues<ChapterKey, Chapter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

impl<'a> IntoIterator for &'a Chapters {
    type Item = &'a Chapter;
    type IntoIter = std::collections::btree_map::Values<'a, ChapterKey, Chapter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}
