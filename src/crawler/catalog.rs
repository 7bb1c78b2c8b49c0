//! Turns the raw chapter list into per-branch, uniquely keyed collections.

use std::collections::BTreeMap;

use super::payload::{RawBranch, RawChapter};
use crate::error::{Error, Result};
use crate::models::{BranchId, Chapter, ChapterKey, Chapters};

/// Branch used when the source declares none.
pub const NO_BRANCHES: &str = "nobranches";

/// Step added to a colliding key until it is free.
pub const COLLISION_STEP: f64 = 0.01;

/// Builds the chapter catalogue of a novel.
///
/// Chapters sharing a number inside one branch are spread out by
/// [`COLLISION_STEP`], so such a chapter no longer carries its literal number
/// as key. With more than a hundred duplicates the shifted keys can even reach
/// the next whole chapter number; the raw number is still kept on the chapter.
pub fn build_catalog(
    list: &[RawChapter],
    branches: &[RawBranch],
    slug: &str,
    domain: &str,
) -> Result<BTreeMap<BranchId, Chapters>> {
    let mut catalog = BTreeMap::new();

    if branches.is_empty() {
        let chapters = build_branch(list.iter(), slug, domain)?;
        catalog.insert(NO_BRANCHES.to_string(), chapters);
        return Ok(catalog);
    }

    for branch in branches {
        let selected = list.iter().filter(|chapter| chapter.branch_id == branch.id);
        let chapters = build_branch(selected, slug, domain)?;
        tracing::debug!(branch = %branch.id, name = %branch.name, chapters = chapters.len(), "branch catalogued");
        catalog.insert(branch.id.clone(), chapters);
    }

    Ok(catalog)
}

fn build_branch<'a>(
    raw: impl Iterator<Item = &'a RawChapter>,
    slug: &str,
    domain: &str,
) -> Result<Chapters> {
    let mut chapters = Chapters::new();
    for chapter in raw {
        let number = parse_number(&chapter.chapter_number)?;
        let key = free_key(&chapters, number);
        chapters.insert(
            Chapter::builder()
                .name(chapter.chapter_name.trim())
                .number(chapter.chapter_number.trim())
                .key(key)
                .url(chapter_url(domain, slug, &chapter.chapter_volume, &chapter.chapter_number))
                .build(),
        );
    }
    Ok(chapters)
}

/// Parses with `.` as decimal point regardless of locale.
fn parse_number(text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| Error::parse("chapter_number", format!("`{text}` is not a chapter number")))
}

/// First of `base`, `base + step`, `base + 2 * step`, ... not yet in `chapters`.
fn free_key(chapters: &Chapters, base: f64) -> ChapterKey {
    let mut attempt = 0u32;
    loop {
        let key = ChapterKey::new(base + f64::from(attempt) * COLLISION_STEP);
        if !chapters.contains_key(key) {
            return key;
        }
        attempt += 1;
    }
}

pub fn chapter_url(domain: &str, slug: &str, volume: &str, number: &str) -> String {
    format!("https://{}/{}/v{}/c{}", domain, slug, volume.trim(), number.trim())
}
