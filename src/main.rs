use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

use ranobe_fetch::{
    Assembler, ChapterSelection, LibMeParser, Novel, NovelParser, ProgressReporter, Settings, TracingReporter,
    find_parser, get_user_input,
};

const SETTINGS_FILE: &str = "ranobe-fetch.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load(Path::new(SETTINGS_FILE)).context("failed to load settings")?;
    let reporter: Arc<dyn ProgressReporter> = Arc::new(TracingReporter);
    let parsers: Vec<Box<dyn NovelParser>> = vec![Box::new(LibMeParser::ranobelib(&settings, reporter.clone())?)];
    let assembler = Assembler::from_settings(&settings, reporter);

    loop {
        println!("\n=== ranobe-fetch ===");
        let url = get_user_input("Novel URL: ")?;
        match find_parser(&parsers, &url) {
            Some(parser) => {
                if let Err(e) = fetch_novel(parser, &assembler, &settings, &url).await {
                    println!("Failed: {:#}", e);
                }
            }
            None => println!("Unsupported URL: {}", url),
        }

        let answer = get_user_input("\nFetch another novel? (y/n): ")?;
        if answer.to_lowercase() != "y" {
            break;
        }
    }

    println!("Bye.");
    Ok(())
}

async fn fetch_novel(parser: &dyn NovelParser, assembler: &Assembler, settings: &Settings, url: &str) -> Result<()> {
    let url = parser.prepare_url(url);
    let slug = slug_of(&url).with_context(|| format!("no novel slug in {}", url))?;
    let token = CancellationToken::new();

    let mut novel = Novel::new(url.clone(), settings.download_root.join(&slug));
    println!("\nFetching {} from {}...", url, parser.site_name());
    parser.parse_common_info(&mut novel, &token).await?;

    if novel.chapters_by_branch.is_empty() {
        println!("No chapters found.");
        return Ok(());
    }
    print_summary(&novel);

    let branch = if novel.chapters_by_branch.len() == 1 {
        novel.chapters_by_branch.keys().next().cloned().unwrap_or_default()
    } else {
        get_user_input("Branch: ")?
    };
    let selection: ChapterSelection = get_user_input("Chapters (e.g. 1-10,12; empty for all): ")?.parse()?;

    let loaded = parser
        .load_chapters(&mut novel, &branch, &selection, settings.include_images, &token)
        .await?;
    println!("Loaded {} chapter(s).", loaded);

    let Some(chapters) = novel.branch(&branch) else {
        return Ok(());
    };
    let selected: Vec<_> = chapters.iter().filter(|c| selection.contains(c.key)).collect();
    let output = settings.download_root.join(format!("{}.epub", slug));
    let report = assembler.assemble(&output, &novel, selected).await?;

    println!(
        "Saved {} ({} chapter(s), {} page(s)).",
        report.path.display(),
        report.pages_per_chapter.len(),
        report.total_pages
    );
    Ok(())
}

fn print_summary(novel: &Novel) {
    println!("Title: {}", novel.name);
    println!("Author: {}", novel.author);
    println!("Branches:");
    for (branch, chapters) in &novel.chapters_by_branch {
        println!("  {}: {} chapter(s)", branch, chapters.len());
    }
}

fn slug_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}
