//! Social posting
//!
//! [`PostingService`] publishes one caption with one image. The HTTP client
//! has a dry-run mode that never touches the network.

pub mod caption;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use charday_common::config::PublisherConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use caption::{CaptionWriter, TemplateCaption};

/// Confirmed publication
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishReceipt {
    pub external_id: String,
    pub external_url: String,
}

/// Posting errors; the message is recorded on the failed slot
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Posting service not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Posting service rejected the post ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Social platform posting API
#[async_trait]
pub trait PostingService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, text: &str, image: &[u8]) -> Result<PublishReceipt, PublishError>;
}

/// JSON-over-HTTP posting service
///
/// Sends `{"text", "image_base64"}` with a bearer token and expects
/// `{"external_id", "external_url"}` back.
pub struct HttpPostingService {
    http_client: reqwest::Client,
    endpoint: Option<String>,
    token: Option<String>,
    dry_run: bool,
}

impl HttpPostingService {
    pub fn new(config: &PublisherConfig, token: Option<String>) -> Result<Self, PublishError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PublishError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            token,
            dry_run: config.dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl PostingService for HttpPostingService {
    fn name(&self) -> &'static str {
        if self.dry_run {
            "dry-run"
        } else {
            "http"
        }
    }

    async fn publish(&self, text: &str, image: &[u8]) -> Result<PublishReceipt, PublishError> {
        if self.dry_run {
            let id = format!("dry-run-{}", Uuid::new_v4());
            info!(
                chars = text.chars().count(),
                image_bytes = image.len(),
                external_id = %id,
                "Dry run, post not sent"
            );
            return Ok(PublishReceipt {
                external_url: format!("dry-run://{}", id),
                external_id: id,
            });
        }

        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| PublishError::NotConfigured("publisher.endpoint is not set".into()))?;

        let mut request = self.http_client.post(endpoint).json(&json!({
            "text": text,
            "image_base64": BASE64.encode(image),
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let receipt: PublishReceipt = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        if receipt.external_id.trim().is_empty() {
            return Err(PublishError::InvalidResponse("empty external_id".into()));
        }

        Ok(receipt)
    }
}
