pub mod chapter;
pub mod novel;

pub use chapter::{Chapter, ChapterBuilder, ChapterKey, Chapters};
pub use novel::Novel;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifier of a branch, e.g. a translation team's release stream.
pub type BranchId = String;

/// A remote image together with the file it is (or will be) saved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    pub path: PathBuf,
}

impl ImageInfo {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }

    /// Cover image stored as `cover.<ext>` inside `folder`.
    pub fn cover_in(folder: &Path, url: &str) -> Self {
        let extension = crate::utils::url_extension(url).unwrap_or("jpg");
        Self::new(url, folder.join(format!("cover.{}", extension)))
    }

    /// Checked against the filesystem on every call.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}
