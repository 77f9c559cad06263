//! Image validation
//!
//! Hard gates, in order, stopping at the first failure:
//! 1. File size at least `min_bytes` (tracking pixels, icons)
//! 2. Width and height at least `min_dimension` (thumbnails, avatars)
//!
//! Soft gate, only with a [`ContentRecognizer`]: recognized labels must contain
//! a character-name token AND (a series token OR a second name token).
//! Recognizer failures pass the image through; a content mismatch rejects it.

use charday_common::config::ImagesConfig;
use image::ImageReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::vision::ContentRecognizer;
use crate::matching::{name_tokens, normalize_name, series_tokens};

/// Result of validating one downloaded candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Size, dimension and optional content checks for candidate images
#[derive(Clone)]
pub struct ImageValidator {
    min_bytes: u64,
    min_dimension: u32,
    recognizer: Option<Arc<dyn ContentRecognizer>>,
}

impl ImageValidator {
    pub fn new(min_bytes: u64, min_dimension: u32) -> Self {
        Self {
            min_bytes,
            min_dimension,
            recognizer: None,
        }
    }

    pub fn from_config(config: &ImagesConfig) -> Self {
        Self::new(config.min_bytes, config.min_dimension)
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn ContentRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub async fn validate(
        &self,
        path: &Path,
        character_name: &str,
        series_name: &str,
    ) -> ValidationOutcome {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => return ValidationOutcome::reject(format!("unreadable file: {}", e)),
        };
        if size < self.min_bytes {
            return ValidationOutcome::reject(format!(
                "file size {} bytes below minimum {}",
                size, self.min_bytes
            ));
        }

        let (width, height) = match read_dimensions(path.to_path_buf()).await {
            Ok(dims) => dims,
            Err(e) => return ValidationOutcome::reject(format!("undecodable image: {}", e)),
        };
        if width < self.min_dimension || height < self.min_dimension {
            return ValidationOutcome::reject(format!(
                "dimensions {}x{} below minimum {}",
                width, height, self.min_dimension
            ));
        }

        let Some(recognizer) = &self.recognizer else {
            return ValidationOutcome::pass();
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return ValidationOutcome::reject(format!("unreadable file: {}", e)),
        };

        match recognizer.detect_labels_and_entities(&bytes).await {
            Ok(labels) => {
                if content_matches(&labels, character_name, series_name) {
                    debug!(character = %character_name, "Content recognition confirmed image");
                    ValidationOutcome::pass()
                } else {
                    ValidationOutcome::reject(format!(
                        "recognized content does not mention {} ({})",
                        character_name, series_name
                    ))
                }
            }
            Err(e) => {
                warn!(
                    recognizer = recognizer.name(),
                    error = %e,
                    "Content recognition unavailable, accepting image"
                );
                ValidationOutcome::pass()
            }
        }
    }
}

async fn read_dimensions(path: PathBuf) -> Result<(u32, u32), String> {
    tokio::task::spawn_blocking(move || {
        ImageReader::open(&path)
            .map_err(|e| e.to_string())?
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

/// Whether recognized labels identify the character
///
/// Requires one name token, plus either one series token or a second name
/// token.
pub fn content_matches(labels: &[String], character_name: &str, series_name: &str) -> bool {
    let haystack: Vec<String> = labels.iter().map(|l| normalize_name(l)).collect();
    let mentioned = |token: &String| haystack.iter().any(|l| l.contains(token.as_str()));

    let mut name_words = name_tokens(character_name);
    name_words.dedup();
    let name_hits = name_words.iter().filter(|t| mentioned(t)).count();
    if name_hits == 0 {
        return false;
    }

    let series_hit = series_tokens(series_name).iter().any(mentioned);
    series_hit || name_hits >= 2
}
