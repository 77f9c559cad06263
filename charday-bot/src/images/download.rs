//! Candidate image download
//!
//! Images land in the work directory under unique names. Requests to the same
//! host are spaced by a keyed courtesy limiter owned by the fetcher.

use async_trait::async_trait;
use governor::DefaultKeyedRateLimiter;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::utils::keyed_courtesy_limiter;

/// Download errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Download exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Not an image: {0}")]
    NotAnImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads a candidate URL to a local file
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError>;
}

/// HTTP implementation of [`ImageFetcher`]
pub struct HttpFetcher {
    http_client: reqwest::Client,
    work_dir: PathBuf,
    max_bytes: u64,
    host_limiter: DefaultKeyedRateLimiter<String>,
}

impl HttpFetcher {
    pub fn new(
        work_dir: PathBuf,
        timeout: Duration,
        max_bytes: u64,
        per_host_interval: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("charday-bot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            work_dir,
            max_bytes,
            host_limiter: keyed_courtesy_limiter(per_host_interval),
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?
            .to_string();

        self.host_limiter.until_key_ready(&host).await;

        let mut response = self
            .http_client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge { limit: self.max_bytes });
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge { limit: self.max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        let extension = sniff_image_extension(&bytes)?;
        let path = self
            .work_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension));

        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::write(&path, &bytes).await?;

        debug!(url = %url, path = %path.display(), bytes = bytes.len(), "Image downloaded");
        Ok(path)
    }
}

/// File extension for image bytes, or an error for anything else
pub fn sniff_image_extension(bytes: &[u8]) -> Result<&'static str, FetchError> {
    match infer::get(bytes) {
        Some(kind) if matches!(kind.matcher_type(), infer::MatcherType::Image) => Ok(kind.extension()),
        Some(kind) => Err(FetchError::NotAnImage(kind.mime_type().to_string())),
        None => Err(FetchError::NotAnImage("unknown content".to_string())),
    }
}
