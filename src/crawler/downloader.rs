use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::PageFetcher;
use crate::error::Result;
use crate::models::ImageInfo;

pub struct ImageDownloader {
    fetcher: Arc<dyn PageFetcher>,
}

impl ImageDownloader {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Saves the cover unless its file already exists.
    ///
    /// Returns `true` when a new file was written.
    pub async fn download_cover(&self, cover: &ImageInfo, token: &CancellationToken) -> Result<bool> {
        if cover.exists() {
            tracing::debug!(path = %cover.path.display(), "cover already on disk");
            return Ok(false);
        }
        if cover.url.is_empty() {
            tracing::warn!("page has no cover image");
            return Ok(false);
        }

        let bytes = self.fetcher.fetch_bytes(&cover.url, token).await?;
        if bytes.is_empty() {
            tracing::warn!(url = %cover.url, "cover download returned nothing");
            return Ok(false);
        }

        if let Some(parent) = cover.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&cover.path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::info!(url = %cover.url, path = %cover.path.display(), "cover saved");
        Ok(true)
    }

    /// Fetches an illustration into memory. Empty when the server refused it.
    pub async fn download_illustration(&self, url: &str, token: &CancellationToken) -> Result<Vec<u8>> {
        let bytes = self.fetcher.fetch_bytes(url, token).await?;
        if bytes.is_empty() {
            tracing::warn!(url, "illustration download returned nothing");
        }
        Ok(bytes)
    }
}
