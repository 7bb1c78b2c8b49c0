//! Parser for the LibMe family of sites (ranobelib and siblings).

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::payload::RawNovelInfo;
use super::{ChapterProcessor, HttpFetcher, ImageDownloader, NovelParser, PageFetcher, build_catalog, script};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{ImageInfo, Novel};
use crate::progress::ProgressReporter;
use crate::utils::ChapterSelection;

const AUTHOR_LABEL: &str = "Автор";
const UNKNOWN_AUTHOR: &str = "(Неизвестно)";
const NO_DESCRIPTION: &str = "(Нет описания)";

static INFO_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.media-info-list__item").expect("valid info selector"));
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".media-description__text").expect("valid description selector"));
static COVER_FALLBACKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["img.media-header__cover", "div.media-sidebar__cover.paper > img"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid cover selector"))
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibMeSite {
    pub domain: &'static str,
    pub name: &'static str,
}

impl LibMeSite {
    pub const RANOBELIB: LibMeSite = LibMeSite {
        domain: "ranobelib.me",
        name: "RanobeLib",
    };
}

/// Everything read from the novel page, owned so no parsed DOM outlives the call.
struct ScrapedPage {
    info: RawNovelInfo,
    author: String,
    description: String,
    cover_url: String,
}

pub struct LibMeParser {
    site: LibMeSite,
    fetcher: Arc<dyn PageFetcher>,
    downloader: ImageDownloader,
    processor: ChapterProcessor,
    reporter: Arc<dyn ProgressReporter>,
}

impl LibMeParser {
    pub fn new(
        site: LibMeSite,
        fetcher: Arc<dyn PageFetcher>,
        settings: &Settings,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            site,
            downloader: ImageDownloader::new(fetcher.clone()),
            processor: ChapterProcessor::new(fetcher.clone(), settings.fan_out, settings.request_delay()),
            fetcher,
            reporter,
        }
    }

    pub fn ranobelib(settings: &Settings, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(settings)?);
        Ok(Self::new(LibMeSite::RANOBELIB, fetcher, settings, reporter))
    }

    /// Slug of the novel in a URL on this site.
    fn slug(&self, url: &str) -> Option<String> {
        let url = Url::parse(url.trim()).ok()?;
        let host = url.host_str()?;
        if host != self.site.domain && host.strip_prefix("www.") != Some(self.site.domain) {
            return None;
        }
        url.path_segments()?
            .find(|segment| !segment.is_empty())
            .map(str::to_string)
    }

    fn scrape_page(&self, page: &str, page_url: &str) -> Result<Option<ScrapedPage>> {
        let document = Html::parse_document(page);
        let Some(info) = script::extract_novel_info(&document)? else {
            return Ok(None);
        };

        let cover_url = cover_url(&document, &info.manga.name)
            .map(|src| Url::parse(page_url).and_then(|base| base.join(&src)).map(String::from).unwrap_or(src))
            .unwrap_or_default();

        Ok(Some(ScrapedPage {
            author: novel_author(&document),
            description: novel_description(&document),
            cover_url,
            info,
        }))
    }
}

#[async_trait]
impl NovelParser for LibMeParser {
    fn site_name(&self) -> &str {
        self.site.name
    }

    fn validate_url(&self, url: &str) -> bool {
        self.slug(url).is_some()
    }

    fn prepare_url(&self, url: &str) -> String {
        match self.slug(url) {
            Some(slug) => format!("https://{}/{}", self.site.domain, slug),
            None => url.trim().to_string(),
        }
    }

    async fn parse_common_info(&self, novel: &mut Novel, token: &CancellationToken) -> Result<()> {
        self.reporter.report(0, 0, "loading novel info");
        tokio::fs::create_dir_all(&novel.download_root).await?;

        if novel.url.is_empty() {
            return Ok(());
        }

        let page = self.fetcher.fetch_text(&novel.url, token).await?;
        if page.is_empty() {
            tracing::warn!(url = %novel.url, "novel page unavailable");
            return Ok(());
        }
        let Some(scraped) = self.scrape_page(&page, &novel.url)? else {
            tracing::warn!(url = %novel.url, "no novel data on page");
            return Ok(());
        };

        let mut fresh = Novel::new(novel.url.clone(), novel.download_root.clone());
        fresh.name = scraped.info.manga.display_name().to_string();
        fresh.author = scraped.author;
        fresh.description = scraped.description;

        fresh.chapters_by_branch = build_catalog(
            &scraped.info.chapters.list,
            &scraped.info.chapters.branches,
            &scraped.info.manga.slug,
            self.site.domain,
        )?;

        if !novel.has_cover_on_disk() {
            let cover = match &novel.cover {
                Some(cover) if !cover.url.is_empty() => cover.clone(),
                _ => ImageInfo::cover_in(&novel.download_root, &scraped.cover_url),
            };
            self.downloader.download_cover(&cover, token).await?;
            fresh.cover = Some(cover);
        }

        tracing::info!(
            name = %fresh.name,
            branches = fresh.chapters_by_branch.len(),
            chapters = fresh.chapter_count(),
            "novel info parsed"
        );
        novel.merge(fresh);
        self.reporter.report(1, 1, "novel info loaded");
        Ok(())
    }

    async fn load_chapters(
        &self,
        novel: &mut Novel,
        branch: &str,
        selection: &ChapterSelection,
        include_images: bool,
        token: &CancellationToken,
    ) -> Result<usize> {
        let chapters = novel
            .branch_mut(branch)
            .ok_or_else(|| Error::parse("branch", format!("novel has no branch `{branch}`")))?;
        self.processor
            .fetch_and_process_chapters(chapters, selection, include_images, token, self.reporter.as_ref())
            .await
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn novel_author(document: &Html) -> String {
    document
        .select(&INFO_ITEM)
        .find_map(|item| {
            let mut children = item.child_elements();
            let label = children.next()?;
            if element_text(label).to_lowercase() != AUTHOR_LABEL.to_lowercase() {
                return None;
            }
            let value = children.next()?.child_elements().next()?;
            Some(element_text(value))
        })
        .filter(|author| !author.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

fn novel_description(document: &Html) -> String {
    document
        .select(&DESCRIPTION)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string())
}

fn cover_url(document: &Html, title: &str) -> Option<String> {
    let by_title = Selector::parse(&format!(r#"img[alt="{}"]"#, title.replace('"', "\\\""))).ok();
    by_title
        .iter()
        .chain(COVER_FALLBACKS.iter())
        .find_map(|selector| document.select(selector).next())
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
}
