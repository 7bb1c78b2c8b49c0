use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures_util::{StreamExt, stream};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ImageDownloader, PageFetcher};
use crate::error::{Error, Result};
use crate::models::{ChapterKey, Chapters};
use crate::progress::ProgressReporter;
use crate::utils::ChapterSelection;

static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".reader-container", ".reader__container", "article"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid content selector"))
        .collect()
});
static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("valid img selector"));

/// Body of one chapter page, ready to be stored on the chapter.
#[derive(Debug, Default)]
pub struct LoadedChapter {
    pub content: String,
    pub images: HashMap<String, Vec<u8>>,
}

/// Chapter body as found on the page, before any image is fetched.
struct RawBody {
    html: String,
    /// `(serialized <img> tag, src)` in document order.
    images: Vec<(String, String)>,
}

pub struct ChapterProcessor {
    fetcher: Arc<dyn PageFetcher>,
    downloader: ImageDownloader,
    fan_out: usize,
    delay: Duration,
}

impl ChapterProcessor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, fan_out: usize, delay: Duration) -> Self {
        Self {
            downloader: ImageDownloader::new(fetcher.clone()),
            fetcher,
            fan_out: fan_out.max(1),
            delay,
        }
    }

    /// Fills in the content of every selected chapter that has none yet.
    ///
    /// Nothing is written to `chapters` unless every fetch succeeds. Returns the
    /// number of chapters that received content.
    pub async fn fetch_and_process_chapters(
        &self,
        chapters: &mut Chapters,
        selection: &ChapterSelection,
        include_images: bool,
        token: &CancellationToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<usize> {
        let jobs: Vec<(ChapterKey, String)> = chapters
            .iter()
            .filter(|chapter| !chapter.is_loaded() && selection.contains(chapter.key))
            .map(|chapter| (chapter.key, chapter.url.clone()))
            .collect();
        let total = jobs.len();
        reporter.report(0, total, "loading chapters");

        let mut results = stream::iter(jobs)
            .map(|(key, url)| async move {
                let loaded = self.fetch_chapter_content(key, &url, include_images, token).await?;
                self.pause(token).await?;
                Ok::<_, Error>((key, loaded))
            })
            .buffer_unordered(self.fan_out);

        let mut fetched = Vec::with_capacity(total);
        while let Some(result) = results.next().await {
            let (key, loaded) = result?;
            fetched.push((key, loaded));
            reporter.report(fetched.len(), total, "loading chapters");
        }
        drop(results);

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut updated = 0;
        for (key, loaded) in fetched {
            let (Some(loaded), Some(chapter)) = (loaded, chapters.get_mut(key)) else {
                continue;
            };
            chapter.content = loaded.content;
            chapter.images = loaded.images;
            updated += 1;
        }
        tracing::info!(updated, requested = total, "chapters loaded");
        Ok(updated)
    }

    /// Fetches a chapter page and its illustrations.
    ///
    /// `Ok(None)` when the page is unavailable or has no recognizable body.
    pub async fn fetch_chapter_content(
        &self,
        key: ChapterKey,
        chapter_url: &str,
        include_images: bool,
        token: &CancellationToken,
    ) -> Result<Option<LoadedChapter>> {
        tracing::debug!(url = chapter_url, "fetching chapter");
        let page = self.fetcher.fetch_text(chapter_url, token).await?;
        if page.is_empty() {
            tracing::warn!(url = chapter_url, "chapter page unavailable");
            return Ok(None);
        }
        let Some(body) = extract_body(&page) else {
            tracing::warn!(url = chapter_url, "chapter body not found");
            return Ok(None);
        };

        let mut content = body.html;
        let mut images = HashMap::new();
        // src -> reference name, `None` when the download came back empty.
        let mut seen: HashMap<String, Option<String>> = HashMap::new();
        for (tag, src) in body.images {
            if !include_images {
                content = content.replace(&tag, "");
                continue;
            }

            let name = match seen.get(&src) {
                Some(name) => name.clone(),
                None => {
                    let image_url = resolve_url(chapter_url, &src)?;
                    let bytes = self.downloader.download_illustration(&image_url, token).await?;
                    let name = (!bytes.is_empty()).then(|| {
                        let name = image_name(key, &image_url, &images);
                        images.insert(name.clone(), bytes);
                        name
                    });
                    seen.insert(src, name.clone());
                    name
                }
            };
            match name {
                Some(name) => content = content.replace(&tag, &format!(r#"<img src="{}" alt=""/>"#, name)),
                None => content = content.replace(&tag, ""),
            }
        }

        Ok(Some(LoadedChapter { content, images }))
    }

    async fn pause(&self, token: &CancellationToken) -> Result<()> {
        if self.delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.delay) => Ok(()),
        }
    }
}

fn extract_body(page: &str) -> Option<RawBody> {
    let document = Html::parse_document(page);
    let container = CONTENT_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())?;

    let images = container
        .select(&IMG_SELECTOR)
        .filter_map(|img| {
            let src = img
                .value()
                .attr("data-src")
                .or_else(|| img.value().attr("src"))?
                .trim();
            (!src.is_empty()).then(|| (img.html(), src.to_string()))
        })
        .collect();

    Some(RawBody {
        html: container.inner_html().trim().to_string(),
        images,
    })
}

fn resolve_url(base: &str, src: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|_| Error::InvalidUrl(base.to_string()))?;
    base.join(src)
        .map(String::from)
        .map_err(|_| Error::InvalidUrl(src.to_string()))
}

/// Reference name for an illustration: chapter key plus the file name, made
/// unique within the chapter.
fn image_name(key: ChapterKey, image_url: &str, taken: &HashMap<String, Vec<u8>>) -> String {
    let file = image_url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|file| !file.is_empty())
        .unwrap_or("image");
    let base = format!("c{}_{}", key, file);

    let mut name = base.clone();
    let mut n = 2;
    while taken.contains_key(&name) {
        name = format!("{}_{}", n, base);
        n += 1;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::FakeFetcher;
    use crate::models::Chapter;
    use crate::progress::NoopReporter;

    fn chapter_page(body: &str) -> String {
        format!(r#"<html><body><div class="reader-container">{body}</div></body></html>"#)
    }

    fn catalogue() -> Chapters {
        (1..=3)
            .map(|n| {
                Chapter::builder()
                    .key(n as f64)
                    .url(format!("https://ranobelib.me/novel/v1/c{n}"))
                    .build()
            })
            .collect()
    }

    fn fetcher() -> FakeFetcher {
        let mut fetcher = FakeFetcher::default();
        for n in 1..=3 {
            fetcher.pages.insert(
                format!("https://ranobelib.me/novel/v1/c{n}"),
                chapter_page(&format!("<p>Text {n}</p>")),
            );
        }
        fetcher
    }

    fn processor(fetcher: FakeFetcher) -> ChapterProcessor {
        ChapterProcessor::new(Arc::new(fetcher), 2, Duration::ZERO)
    }

    #[tokio::test]
    async fn loads_selected_chapters_only() {
        let mut chapters = catalogue();
        let selection: ChapterSelection = "2-3".parse().unwrap();
        let updated = processor(fetcher())
            .fetch_and_process_chapters(&mut chapters, &selection, true, &CancellationToken::new(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(updated, 2);
        assert!(!chapters.get(ChapterKey::new(1.0)).unwrap().is_loaded());
        assert_eq!(chapters.get(ChapterKey::new(3.0)).unwrap().content, "<p>Text 3</p>");
    }

    #[tokio::test]
    async fn already_loaded_chapters_are_not_refetched() {
        let mut chapters = catalogue();
        chapters.get_mut(ChapterKey::new(1.0)).unwrap().content = "<p>kept</p>".into();
        let fetcher = Arc::new(fetcher());
        let processor = ChapterProcessor::new(fetcher.clone(), 1, Duration::ZERO);

        processor
            .fetch_and_process_chapters(&mut chapters, &ChapterSelection::All, true, &CancellationToken::new(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(chapters.get(ChapterKey::new(1.0)).unwrap().content, "<p>kept</p>");
        let requests = fetcher.requests.lock().unwrap();
        assert!(!requests.iter().any(|url| url.ends_with("/c1")));
    }

    #[tokio::test]
    async fn illustrations_are_downloaded_and_renamed() {
        let mut fetcher = fetcher();
        fetcher.pages.insert(
            "https://ranobelib.me/novel/v1/c1".into(),
            chapter_page(r#"<p>Look</p><p><img src="/uploads/pic.png?x=1"></p><img src="https://cdn/missing.jpg">"#),
        );
        fetcher.files.insert("https://ranobelib.me/uploads/pic.png?x=1".into(), vec![7, 7]);

        let loaded = processor(fetcher)
            .fetch_chapter_content(ChapterKey::new(1.0), "https://ranobelib.me/novel/v1/c1", true, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.images.len(), 1);
        assert_eq!(loaded.images["c1_pic.png"], vec![7, 7]);
        assert!(loaded.content.contains(r#"<img src="c1_pic.png" alt=""/>"#));
        assert!(!loaded.content.contains("missing.jpg"));
    }

    #[tokio::test]
    async fn repeated_illustration_is_fetched_once() {
        let mut fetcher = fetcher();
        fetcher.pages.insert(
            "https://ranobelib.me/novel/v1/c1".into(),
            chapter_page(r#"<p><img src="/p.png"></p><p><img src="/p.png"></p><img class="wide" src="/p.png">"#),
        );
        fetcher.files.insert("https://ranobelib.me/p.png".into(), vec![1, 2, 3]);
        let fetcher = Arc::new(fetcher);
        let processor = ChapterProcessor::new(fetcher.clone(), 1, Duration::ZERO);

        let loaded = processor
            .fetch_chapter_content(ChapterKey::new(1.0), "https://ranobelib.me/novel/v1/c1", true, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.images.keys().collect::<Vec<_>>(), vec!["c1_p.png"]);
        assert_eq!(loaded.content.matches(r#"<img src="c1_p.png" alt=""/>"#).count(), 3);
        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.iter().filter(|url| url.ends_with("/p.png")).count(), 1);
    }

    #[tokio::test]
    async fn images_are_stripped_when_not_wanted() {
        let mut fetcher = fetcher();
        fetcher.pages.insert(
            "https://ranobelib.me/novel/v1/c1".into(),
            chapter_page(r#"<p>Look</p><img src="/pic.png">"#),
        );
        let fetcher = Arc::new(fetcher);
        let processor = ChapterProcessor::new(fetcher.clone(), 1, Duration::ZERO);

        let loaded = processor
            .fetch_chapter_content(ChapterKey::new(1.0), "https://ranobelib.me/novel/v1/c1", false, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.content, "<p>Look</p>");
        assert!(loaded.images.is_empty());
        assert_eq!(fetcher.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_discards_everything() {
        let mut chapters = catalogue();
        let token = CancellationToken::new();
        token.cancel();

        let err = processor(fetcher())
            .fetch_and_process_chapters(&mut chapters, &ChapterSelection::All, true, &token, &NoopReporter)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(chapters.iter().all(|chapter| !chapter.is_loaded()));
    }

    #[tokio::test]
    async fn missing_page_leaves_chapter_unloaded() {
        let mut chapters = catalogue();
        let mut fetcher = fetcher();
        fetcher.pages.remove("https://ranobelib.me/novel/v1/c2");

        let updated = processor(fetcher)
            .fetch_and_process_chapters(&mut chapters, &ChapterSelection::All, true, &CancellationToken::new(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(updated, 2);
        assert!(!chapters.get(ChapterKey::new(2.0)).unwrap().is_loaded());
    }

    #[test]
    fn duplicate_file_names_are_suffixed() {
        let mut taken = HashMap::new();
        taken.insert("c1_a.png".to_string(), vec![]);
        assert_eq!(image_name(ChapterKey::new(1.0), "https://x/a.png", &taken), "2_c1_a.png");
        assert_eq!(image_name(ChapterKey::new(1.5), "https://x/", &HashMap::new()), "c1.5_image");
    }
}
