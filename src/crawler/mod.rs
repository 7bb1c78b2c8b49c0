pub mod catalog;
pub mod downloader;
pub mod fetcher;
pub mod libme;
pub mod payload;
pub mod processor;
pub mod script;

pub use catalog::build_catalog;
pub use downloader::ImageDownloader;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use libme::{LibMeParser, LibMeSite};
pub use processor::ChapterProcessor;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Novel;
use crate::utils::ChapterSelection;

/// One supported source site.
///
/// Implementations only produce data; merging, cataloguing and assembly do not
/// depend on which site a novel came from.
#[async_trait]
pub trait NovelParser: Send + Sync {
    /// Human-readable site name.
    fn site_name(&self) -> &str;

    fn validate_url(&self, url: &str) -> bool;

    /// Canonical novel URL for any page of the novel on this site.
    fn prepare_url(&self, url: &str) -> String;

    /// Fetches metadata and the chapter catalogue and merges them into `novel`.
    ///
    /// A page without recognizable data leaves `novel` untouched.
    async fn parse_common_info(&self, novel: &mut Novel, token: &CancellationToken) -> Result<()>;

    /// Downloads the bodies of the selected chapters of `branch`.
    async fn load_chapters(
        &self,
        novel: &mut Novel,
        branch: &str,
        selection: &ChapterSelection,
        include_images: bool,
        token: &CancellationToken,
    ) -> Result<usize>;
}

/// First parser that accepts `url`.
pub fn find_parser<'a>(parsers: &'a [Box<dyn NovelParser>], url: &str) -> Option<&'a dyn NovelParser> {
    parsers
        .iter()
        .find(|parser| parser.validate_url(url))
        .map(|parser| parser.as_ref())
}
