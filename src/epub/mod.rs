pub mod document;
pub mod images;
pub mod render;
pub mod resize;

pub use document::{BookMetadata, EpubDocument, OutputDocument};
pub use images::{EmbeddedImage, ImageSource, ImageTable};
pub use render::{Page, PageRenderer, SubDocument, XhtmlPageRenderer};
pub use resize::resize_to_fit;

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{Chapter, ChapterKey, Novel};
use crate::progress::ProgressReporter;
use crate::utils::escape_xml;

/// Output files with an assembly currently running.
static ACTIVE_OUTPUTS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Claims an output path for the lifetime of the guard.
struct OutputGuard(PathBuf);

impl OutputGuard {
    fn acquire(path: &Path) -> Result<Self> {
        let key = std::path::absolute(path)?;
        let mut active = ACTIVE_OUTPUTS.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(Error::AssemblyInProgress(key));
        }
        Ok(Self(key))
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        ACTIVE_OUTPUTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub path: PathBuf,
    /// Rendered page count of every chapter, in output order.
    pub pages_per_chapter: Vec<(ChapterKey, usize)>,
    pub total_pages: usize,
}

/// Renders chapters one by one and splices their pages into a single book.
pub struct Assembler<R = XhtmlPageRenderer> {
    renderer: R,
    frame: (u32, u32),
    reporter: Arc<dyn ProgressReporter>,
}

impl Assembler<XhtmlPageRenderer> {
    pub fn from_settings(settings: &Settings, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self::new(XhtmlPageRenderer::new(settings.page_char_budget), settings.frame(), reporter)
    }
}

impl<R> Assembler<R>
where
    R: PageRenderer + Clone + Send + 'static,
{
    pub fn new(renderer: R, frame: (u32, u32), reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            renderer,
            frame,
            reporter,
        }
    }

    /// Writes `chapters`, in the order given, as one book to `path`.
    ///
    /// The work runs on the blocking pool. Nothing is left at `path` unless the
    /// whole book was written.
    pub async fn assemble<'a>(
        &self,
        path: &Path,
        novel: &Novel,
        chapters: impl IntoIterator<Item = &'a Chapter>,
    ) -> Result<AssemblyReport> {
        let guard = OutputGuard::acquire(path)?;
        let job = AssemblyJob {
            path: path.to_path_buf(),
            metadata: BookMetadata::from_novel(novel),
            chapters: chapters.into_iter().cloned().collect(),
            renderer: self.renderer.clone(),
            frame: self.frame,
            reporter: Arc::clone(&self.reporter),
        };

        tracing::info!(path = %path.display(), chapters = job.chapters.len(), "assembling book");
        let report = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            job.run()
        })
        .await
        .map_err(|e| Error::Render(format!("assembly task failed: {}", e)))??;

        tracing::info!(path = %report.path.display(), pages = report.total_pages, "book written");
        Ok(report)
    }
}

struct AssemblyJob<R> {
    path: PathBuf,
    metadata: BookMetadata,
    chapters: Vec<Chapter>,
    renderer: R,
    frame: (u32, u32),
    reporter: Arc<dyn ProgressReporter>,
}

impl<R: PageRenderer> AssemblyJob<R> {
    fn run(self) -> Result<AssemblyReport> {
        if self.chapters.is_empty() {
            return Err(Error::Render("no chapters to assemble".to_string()));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = part_path(&self.path);
        let result = self.write(&temp).and_then(|report| {
            fs::rename(&temp, &self.path)?;
            Ok(report)
        });
        if result.is_err() && temp.exists() {
            if let Err(e) = fs::remove_file(&temp) {
                tracing::warn!(path = %temp.display(), error = %e, "failed to remove partial output");
            }
        }
        result
    }

    fn write(&self, temp: &Path) -> Result<AssemblyReport> {
        let mut images = ImageTable::from_chapters(&self.chapters, self.frame);
        let mut document = EpubDocument::new(self.metadata.clone());
        let mut pages_per_chapter = Vec::with_capacity(self.chapters.len());
        let total = self.chapters.len();

        for (index, chapter) in self.chapters.iter().enumerate() {
            let title = chapter.title();
            if !chapter.is_loaded() {
                tracing::warn!(key = %chapter.key, title = %title, "chapter has no content");
            }
            let block = format!("<h2>{}</h2>{}", escape_xml(&title), chapter.content);
            let sub = self.renderer.render(&title, &block, &mut images)?;

            document.begin_section(&sub.title);
            let count = sub.pages.len();
            for page in sub.pages {
                document.append_page(page);
            }
            pages_per_chapter.push((chapter.key, count));

            tracing::debug!(key = %chapter.key, pages = count, "chapter rendered");
            self.reporter.report(index + 1, total, &title);
        }

        document.save(temp)?;
        Ok(AssemblyReport {
            path: self.path.clone(),
            total_pages: document.page_count(),
            pages_per_chapter,
        })
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
