use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::{Error, Result};

/// Retrieves raw page text and bytes.
///
/// Non-success HTTP statuses yield empty output; only transport failures are errors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, token: &CancellationToken) -> Result<String>;
    async fn fetch_bytes(&self, url: &str, token: &CancellationToken) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<Option<reqwest::Response>> {
        tracing::debug!(url, "GET");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            tracing::warn!(url, status = response.status().as_u16(), "non-success response");
            return Ok(None);
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str, token: &CancellationToken) -> Result<String> {
        let request = async {
            let text = match self.get(url).await? {
                Some(response) => response.text().await?,
                None => String::new(),
            };
            Ok::<_, Error>(text)
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = request => result,
        }
    }

    async fn fetch_bytes(&self, url: &str, token: &CancellationToken) -> Result<Vec<u8>> {
        let request = async {
            let bytes = match self.get(url).await? {
                Some(response) => response.bytes().await?.to_vec(),
                None => Vec::new(),
            };
            Ok::<_, Error>(bytes)
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = request => result,
        }
    }
}
