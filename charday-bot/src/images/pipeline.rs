//! Image resolution pipeline
//!
//! **Algorithm:**
//! 1. Ask each provider, in fixed priority order, for candidates
//! 2. Sort candidates by URL when the provider's own order is unstable
//! 3. Download and validate each candidate in turn
//! 4. Return the first valid image; delete rejected downloads and move on
//!
//! A provider error only empties that provider's candidate list. A URL is
//! attempted at most once per run even if several providers propose it.

use charday_common::{CanonicalCharacter, RawCharacter, ResolvedImage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::download::ImageFetcher;
use super::validator::ImageValidator;
use super::{ImageCandidate, ImageProvider, ImageSubject};

/// Ordered providers plus the fetch and validation stages
pub struct ImagePipeline {
    providers: Vec<Arc<dyn ImageProvider>>,
    fetcher: Arc<dyn ImageFetcher>,
    validator: ImageValidator,
    candidates_per_provider: usize,
}

impl ImagePipeline {
    /// `providers` are tried in the given order
    pub fn new(
        providers: Vec<Arc<dyn ImageProvider>>,
        fetcher: Arc<dyn ImageFetcher>,
        validator: ImageValidator,
        candidates_per_provider: usize,
    ) -> Self {
        Self {
            providers,
            fetcher,
            validator,
            candidates_per_provider: candidates_per_provider.max(1),
        }
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First valid image for the character, or `None` when every provider is
    /// exhausted
    pub async fn resolve(
        &self,
        raw: &RawCharacter,
        canonical: Option<&CanonicalCharacter>,
    ) -> Option<ResolvedImage> {
        let subject = ImageSubject::new(raw, canonical);
        let character_name = subject.character_name();
        let series_name = subject.series_name();
        let mut attempted: HashSet<String> = HashSet::new();

        for provider in &self.providers {
            let provider_rank = provider.rank();

            let mut candidates = match provider
                .candidates(&subject, self.candidates_per_provider)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        character = %character_name,
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                    continue;
                }
            };

            if provider.sorts_by_url() {
                candidates.sort();
            }

            debug!(
                character = %character_name,
                provider = provider.name(),
                candidates = candidates.len(),
                "Provider candidates"
            );

            for ImageCandidate { url } in candidates {
                if !attempted.insert(url.clone()) {
                    continue;
                }

                let path = match self.fetcher.fetch(&url).await {
                    Ok(path) => path,
                    Err(e) => {
                        debug!(provider = provider.name(), url = %url, error = %e, "Download failed");
                        continue;
                    }
                };

                let outcome = self
                    .validator
                    .validate(&path, character_name, series_name)
                    .await;

                if outcome.valid {
                    info!(
                        character = %character_name,
                        provider = provider.name(),
                        rank = provider_rank,
                        url = %url,
                        "Image resolved"
                    );
                    return Some(ResolvedImage {
                        local_reference: path,
                        provider_name: provider.name().to_string(),
                        provider_rank,
                        source_url: url,
                    });
                }

                debug!(
                    provider = provider.name(),
                    url = %url,
                    reason = outcome.reason.as_deref().unwrap_or("unknown"),
                    "Candidate rejected"
                );
                discard(&path).await;
            }
        }

        info!(character = %character_name, "No publishable image from any provider");
        None
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Could not remove rejected image");
    }
}
