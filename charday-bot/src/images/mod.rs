//! Image resolution
//!
//! An ordered list of [`ImageProvider`]s proposes candidate URLs; the
//! [`ImagePipeline`] downloads each candidate, runs the [`ImageValidator`] and
//! keeps the first one that passes.
//!
//! Provider order is fixed at construction time so the preparation run, a
//! manual publish and a recovery run all pick the same image.

pub mod download;
pub mod pipeline;
pub mod providers;
pub mod validator;
pub mod vision;

use async_trait::async_trait;
use charday_common::{CanonicalCharacter, RawCharacter};
use thiserror::Error;

pub use download::{FetchError, HttpFetcher, ImageFetcher};
pub use pipeline::ImagePipeline;
pub use validator::{ImageValidator, ValidationOutcome};
pub use vision::{ContentRecognizer, GoogleVisionClient, RecognitionError};

/// Character an image is being looked up for
#[derive(Debug, Clone, Copy)]
pub struct ImageSubject<'a> {
    pub raw: &'a RawCharacter,
    pub canonical: Option<&'a CanonicalCharacter>,
}

impl<'a> ImageSubject<'a> {
    pub fn new(raw: &'a RawCharacter, canonical: Option<&'a CanonicalCharacter>) -> Self {
        Self { raw, canonical }
    }

    /// Catalog name when resolved, source name otherwise
    pub fn character_name(&self) -> &'a str {
        match self.canonical {
            Some(c) if !c.name.trim().is_empty() => &c.name,
            _ => &self.raw.name,
        }
    }

    /// Authoritative series when resolved, the source's guess otherwise
    pub fn series_name(&self) -> &'a str {
        match self.canonical {
            Some(c) if !c.series_name.trim().is_empty() => &c.series_name,
            _ => self.raw.series_name_guess.as_deref().unwrap_or(""),
        }
    }
}

/// Candidate image proposed by a provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImageCandidate {
    pub url: String,
}

impl ImageCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Image provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One image source queried by the pipeline
///
/// Providers only propose URLs; downloading and validation belong to the
/// pipeline.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider name recorded on the resolved image
    fn name(&self) -> &'static str;

    /// Fixed priority recorded on the resolved image, 1 being the most preferred
    ///
    /// Independent of which other providers are configured.
    fn rank(&self) -> u8;

    /// Whether candidates must be sorted by URL before selection
    ///
    /// Set for providers whose result order is not stable between calls.
    fn sorts_by_url(&self) -> bool {
        false
    }

    /// Up to `limit` candidates for `subject`
    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError>;
}
