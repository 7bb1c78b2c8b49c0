use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{BranchId, Chapters, ImageInfo};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Novel {
    pub url: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub cover: Option<ImageInfo>,
    pub download_root: PathBuf,
    pub chapters_by_branch: BTreeMap<BranchId, Chapters>,
}

impl Novel {
    pub fn new(url: impl Into<String>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            download_root: download_root.into(),
            ..Self::default()
        }
    }

    pub fn has_cover_on_disk(&self) -> bool {
        self.cover.as_ref().is_some_and(ImageInfo::exists)
    }

    pub fn branch(&self, branch: &str) -> Option<&Chapters> {
        self.chapters_by_branch.get(branch)
    }

    pub fn branch_mut(&mut self, branch: &str) -> Option<&mut Chapters> {
        self.chapters_by_branch.get_mut(branch)
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters_by_branch.values().map(Chapters::len).sum()
    }

    /// Folds freshly scraped data into this record.
    ///
    /// Metadata always follows `fresh`. The cover is only replaced while no
    /// cover file exists locally. Chapters are only ever added: a chapter whose
    /// key is already known keeps its downloaded content and images.
    pub fn merge(&mut self, fresh: Novel) -> &mut Self {
        self.name = fresh.name;
        self.author = fresh.author;
        self.description = fresh.description;

        if !self.has_cover_on_disk() && fresh.cover.is_some() {
            self.cover = fresh.cover;
        }

        for (branch_id, fresh_chapters) in fresh.chapters_by_branch {
            match self.chapters_by_branch.get_mut(&branch_id) {
                None => {
                    tracing::debug!(branch = %branch_id, chapters = fresh_chapters.len(), "new branch");
                    self.chapters_by_branch.insert(branch_id, fresh_chapters);
                }
                Some(existing) => {
                    for chapter in fresh_chapters {
                        if !existing.contains_key(chapter.key) {
                            existing.insert(chapter);
                        }
                    }
                }
            }
        }

        self
    }
}
