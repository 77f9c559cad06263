//! Content recognition
//!
//! Optional soft gate of the image validator: the recognizer returns free-text
//! labels and web entities describing an image.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use charday_common::config::VisionConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Recognition service errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Label and entity detection for an image
#[async_trait]
pub trait ContentRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect_labels_and_entities(&self, image: &[u8])
        -> Result<Vec<String>, RecognitionError>;
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    #[serde(default)]
    label_annotations: Vec<Annotation>,
    #[serde(default)]
    web_detection: Option<WebDetection>,
    #[serde(default)]
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebDetection {
    #[serde(default)]
    web_entities: Vec<Annotation>,
    #[serde(default)]
    best_guess_labels: Vec<BestGuess>,
}

#[derive(Debug, Deserialize)]
struct BestGuess {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

impl AnnotateResult {
    fn into_labels(self) -> Result<Vec<String>, RecognitionError> {
        if let Some(status) = self.error {
            return Err(RecognitionError::Api(status.message));
        }

        let web = self.web_detection.unwrap_or_default();
        let labels = self
            .label_annotations
            .into_iter()
            .chain(web.web_entities)
            .filter_map(|a| a.description)
            .chain(web.best_guess_labels.into_iter().filter_map(|b| b.label))
            .filter(|l| !l.trim().is_empty())
            .collect();

        Ok(labels)
    }
}

/// Google Cloud Vision `images:annotate` client
pub struct GoogleVisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleVisionClient {
    pub fn new(config: &VisionConfig, api_key: String) -> Result<Self, RecognitionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RecognitionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl ContentRecognizer for GoogleVisionClient {
    fn name(&self) -> &'static str {
        "google-vision"
    }

    async fn detect_labels_and_entities(
        &self,
        image: &[u8],
    ) -> Result<Vec<String>, RecognitionError> {
        let body = json!({
            "requests": [{
                "image": { "content": BASE64.encode(image) },
                "features": [
                    { "type": "LABEL_DETECTION", "maxResults": 20 },
                    { "type": "WEB_DETECTION", "maxResults": 20 }
                ]
            }]
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| RecognitionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RecognitionError::Api(format!("HTTP {}", response.status())));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| RecognitionError::Parse(e.to_string()))?;

        let labels = parsed
            .responses
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_labels()?;

        debug!(labels = labels.len(), "Content recognition complete");
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_collected_from_all_sections() {
        let parsed: AnnotateResponse = serde_json::from_str(
            r#"{"responses": [{
                "labelAnnotations": [{"description": "Anime"}, {"description": "Cartoon"}],
                "webDetection": {
                    "webEntities": [{"description": "Suguru Geto"}, {"entityId": "/m/x"}],
                    "bestGuessLabels": [{"label": "jujutsu kaisen geto"}]
                }
            }]}"#,
        )
        .unwrap();

        let labels = parsed
            .responses
            .into_iter()
            .next()
            .unwrap()
            .into_labels()
            .unwrap();
        assert_eq!(
            labels,
            vec!["Anime", "Cartoon", "Suguru Geto", "jujutsu kaisen geto"]
        );
    }

    #[test]
    fn test_per_image_error_surfaces() {
        let parsed: AnnotateResponse = serde_json::from_str(
            r#"{"responses": [{"error": {"code": 3, "message": "Bad image data."}}]}"#,
        )
        .unwrap();
        let err = parsed
            .responses
            .into_iter()
            .next()
            .unwrap()
            .into_labels()
            .unwrap_err();
        assert!(err.to_string().contains("Bad image data"));
    }
}
