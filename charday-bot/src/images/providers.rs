//! Image providers, in pipeline priority order
//!
//! 1. [`CuratedArtProvider`] - official art from a curated manifest
//! 2. [`BooruProvider`] - tag-based community images (sorted by URL)
//! 3. [`WebSearchProvider`] - general image search, when keyed (sorted by URL)
//! 4. [`SourceFullImageProvider`] - birthday-list full image field
//! 5. [`CatalogImageProvider`] - catalog image, large before medium
//! 6. [`SourceThumbnailProvider`] - birthday-list thumbnail field

use async_trait::async_trait;
use charday_common::config::{BooruConfig, WebSearchConfig};
use governor::DefaultDirectRateLimiter;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{ImageCandidate, ImageProvider, ImageSubject, ProviderError};
use crate::matching::{series_confirmed, MatchTier, NameQuery};
use crate::utils::courtesy_limiter;

const USER_AGENT: &str = concat!("charday-bot/", env!("CARGO_PKG_VERSION"));

/// Known placeholder images published instead of real artwork
#[derive(Debug, Clone, Default)]
pub struct PlaceholderFilter {
    patterns: Vec<String>,
}

impl PlaceholderFilter {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_placeholder(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.patterns.iter().any(|p| url.contains(p.as_str()))
    }

    /// Usable URL from an optional field, or `None` when blank or a placeholder
    fn usable(&self, url: Option<&str>) -> Option<ImageCandidate> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        if self.is_placeholder(url) {
            debug!(url = %url, "Skipping placeholder image");
            return None;
        }
        Some(ImageCandidate::new(url))
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api(status.as_u16(), body));
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

// ============================================================================
// 1. Curated official art
// ============================================================================

/// Manifest entry of the curated art index
#[derive(Debug, Clone, Deserialize)]
pub struct CuratedEntry {
    pub character: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Official art looked up in a curated JSON manifest
pub struct CuratedArtProvider {
    entries: Vec<CuratedEntry>,
}

impl CuratedArtProvider {
    pub fn new(entries: Vec<CuratedEntry>) -> Self {
        Self { entries }
    }

    /// Load the manifest (a JSON array of entries)
    pub fn from_path(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<CuratedEntry> =
            serde_json::from_str(&content).map_err(|e| ProviderError::Parse(e.to_string()))?;
        info!(path = %path.display(), entries = entries.len(), "Loaded curated art index");
        Ok(Self::new(entries))
    }
}

#[async_trait]
impl ImageProvider for CuratedArtProvider {
    fn name(&self) -> &'static str {
        "curated"
    }

    fn rank(&self) -> u8 {
        1
    }

    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        let query = NameQuery::new(subject.character_name());
        let series = subject.series_name();

        Ok(self
            .entries
            .iter()
            .filter(|e| query.score(&e.character) == MatchTier::Exact)
            .filter(|e| match &e.series {
                Some(s) => series_confirmed(Some(s.as_str()), &[series.to_string()]),
                None => true,
            })
            .flat_map(|e| e.urls.iter())
            .filter(|u| !u.trim().is_empty())
            .take(limit)
            .map(|u| ImageCandidate::new(u.trim()))
            .collect())
    }
}

// ============================================================================
// 2. Tag-based community images
// ============================================================================

#[derive(Debug, Deserialize)]
struct BooruPost {
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    large_file_url: Option<String>,
}

/// Danbooru-compatible tag name: lowercase, words joined by underscores
pub fn booru_tag(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Community images from a Danbooru-compatible `posts.json` API
pub struct BooruProvider {
    http_client: reqwest::Client,
    endpoint: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl BooruProvider {
    pub fn new(
        config: &BooruConfig,
        timeout: Duration,
        request_interval: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            rate_limiter: courtesy_limiter(request_interval),
        })
    }
}

#[async_trait]
impl ImageProvider for BooruProvider {
    fn name(&self) -> &'static str {
        "booru"
    }

    fn rank(&self) -> u8 {
        2
    }

    fn sorts_by_url(&self) -> bool {
        true
    }

    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        let mut tags = booru_tag(subject.character_name());
        let series_tag = booru_tag(subject.series_name());
        if !series_tag.is_empty() {
            tags.push(' ');
            tags.push_str(&series_tag);
        }

        self.rate_limiter.until_ready().await;

        let url = format!("{}/posts.json", self.endpoint);
        let limit_param = limit.to_string();
        let posts: Vec<BooruPost> = get_json(
            self.http_client
                .get(&url)
                .query(&[("tags", tags.as_str()), ("limit", limit_param.as_str())]),
        )
        .await?;

        debug!(tags = %tags, posts = posts.len(), "Booru search");

        Ok(posts
            .into_iter()
            .filter_map(|p| p.large_file_url.or(p.file_url))
            .filter(|u| !u.trim().is_empty())
            .take(limit)
            .map(ImageCandidate::new)
            .collect())
    }
}

// ============================================================================
// 3. General image search
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

/// Google Custom Search image results
pub struct WebSearchProvider {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl WebSearchProvider {
    /// `None` when disabled or missing its key or engine id
    pub fn from_config(
        config: &WebSearchConfig,
        api_key: Option<String>,
        timeout: Duration,
        request_interval: Duration,
    ) -> Result<Option<Self>, ProviderError> {
        if !config.enabled {
            return Ok(None);
        }
        let (Some(api_key), Some(engine_id)) = (api_key, config.engine_id.clone()) else {
            info!("Image search enabled but not keyed, provider disabled");
            return Ok(None);
        };

        Ok(Some(Self {
            http_client: http_client(timeout)?,
            endpoint: config.endpoint.clone(),
            api_key,
            engine_id,
            rate_limiter: courtesy_limiter(request_interval),
        }))
    }
}

#[async_trait]
impl ImageProvider for WebSearchProvider {
    fn name(&self) -> &'static str {
        "web-search"
    }

    fn rank(&self) -> u8 {
        3
    }

    fn sorts_by_url(&self) -> bool {
        true
    }

    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        let query = format!("{} {}", subject.character_name(), subject.series_name())
            .trim()
            .to_string();
        // The API caps num at 10
        let num = limit.clamp(1, 10).to_string();

        self.rate_limiter.until_ready().await;

        let response: SearchResponse = get_json(self.http_client.get(&self.endpoint).query(&[
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", query.as_str()),
            ("searchType", "image"),
            ("num", num.as_str()),
        ]))
        .await?;

        Ok(response
            .items
            .into_iter()
            .map(|i| ImageCandidate::new(i.link))
            .take(limit)
            .collect())
    }
}

// ============================================================================
// 4-6. Field-based providers
// ============================================================================

/// Full-resolution image field of the birthday-list entry
pub struct SourceFullImageProvider {
    placeholders: PlaceholderFilter,
}

impl SourceFullImageProvider {
    pub fn new(placeholders: PlaceholderFilter) -> Self {
        Self { placeholders }
    }
}

#[async_trait]
impl ImageProvider for SourceFullImageProvider {
    fn name(&self) -> &'static str {
        "source-full"
    }

    fn rank(&self) -> u8 {
        4
    }

    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        _limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        Ok(self
            .placeholders
            .usable(subject.raw.full_image_url.as_deref())
            .into_iter()
            .collect())
    }
}

/// Catalog character image, large variant before medium
pub struct CatalogImageProvider;

#[async_trait]
impl ImageProvider for CatalogImageProvider {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn rank(&self) -> u8 {
        5
    }

    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        _limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        Ok(subject
            .canonical
            .and_then(|c| c.image.preferred())
            .map(ImageCandidate::new)
            .into_iter()
            .collect())
    }
}

/// Thumbnail field of the birthday-list entry
pub struct SourceThumbnailProvider {
    placeholders: PlaceholderFilter,
}

impl SourceThumbnailProvider {
    pub fn new(placeholders: PlaceholderFilter) -> Self {
        Self { placeholders }
    }
}

#[async_trait]
impl ImageProvider for SourceThumbnailProvider {
    fn name(&self) -> &'static str {
        "source-thumbnail"
    }

    fn rank(&self) -> u8 {
        6
    }

    async fn candidates(
        &self,
        subject: &ImageSubject<'_>,
        _limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        Ok(self
            .placeholders
            .usable(subject.raw.thumbnail_url.as_deref())
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charday_common::{CanonicalCharacter, CatalogImage, RawCharacter};

    fn raw(full: Option<&str>, thumb: Option<&str>) -> RawCharacter {
        RawCharacter {
            id: "42".into(),
            name: "Suguru Geto".into(),
            series_name_guess: Some("Jujutsu Kaisen".into()),
            favorites_count: 0,
            birthday_label: "Feb 3".into(),
            thumbnail_url: thumb.map(str::to_string),
            full_image_url: full.map(str::to_string),
        }
    }

    fn placeholders() -> PlaceholderFilter {
        PlaceholderFilter::new(&["questionmark".to_string(), "/default.".to_string()])
    }

    #[test]
    fn test_placeholder_detection_is_case_insensitive() {
        let filter = placeholders();
        assert!(filter.is_placeholder("https://cdn.example/images/QuestionMark_23.gif"));
        assert!(filter.is_placeholder("https://cdn.example/default.jpg"));
        assert!(!filter.is_placeholder("https://cdn.example/geto.jpg"));
    }

    #[test]
    fn test_booru_tag() {
        assert_eq!(booru_tag("Suguru  Geto"), "suguru_geto");
        assert_eq!(booru_tag("Jujutsu Kaisen"), "jujutsu_kaisen");
        assert_eq!(booru_tag(""), "");
    }

    #[tokio::test]
    async fn test_source_fields_skip_placeholders() {
        let raw = raw(
            Some("https://cdn.example/questionmark.gif"),
            Some("https://cdn.example/thumb/geto.jpg"),
        );
        let subject = ImageSubject::new(&raw, None);

        let full = SourceFullImageProvider::new(placeholders());
        assert!(full.candidates(&subject, 5).await.unwrap().is_empty());

        let thumb = SourceThumbnailProvider::new(placeholders());
        assert_eq!(
            thumb.candidates(&subject, 5).await.unwrap(),
            vec![ImageCandidate::new("https://cdn.example/thumb/geto.jpg")]
        );
    }

    #[tokio::test]
    async fn test_catalog_provider_prefers_large() {
        let raw = raw(None, None);
        let canonical = CanonicalCharacter {
            id: 1,
            name: "Suguru Getou".into(),
            name_native: None,
            series_name: "Jujutsu Kaisen".into(),
            series_titles: vec![],
            favorites_count: 0,
            about: None,
            genre_tags: vec![],
            image: CatalogImage {
                large: Some("https://img.example/large.png".into()),
                medium: Some("https://img.example/medium.png".into()),
            },
            source_candidate_id: "42".into(),
            verified: true,
        };

        let provider = CatalogImageProvider;
        let found = provider
            .candidates(&ImageSubject::new(&raw, Some(&canonical)), 5)
            .await
            .unwrap();
        assert_eq!(found, vec![ImageCandidate::new("https://img.example/large.png")]);

        let none = provider
            .candidates(&ImageSubject::new(&raw, None), 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_curated_matches_name_and_series() {
        let provider = CuratedArtProvider::new(vec![
            CuratedEntry {
                character: "Geto, Suguru".into(),
                series: Some("Jujutsu Kaisen".into()),
                urls: vec!["https://official.example/geto-1.png".into()],
            },
            CuratedEntry {
                character: "Suguru Geto".into(),
                series: Some("Some Other Show".into()),
                urls: vec!["https://official.example/other.png".into()],
            },
        ]);

        let raw = raw(None, None);
        let found = provider
            .candidates(&ImageSubject::new(&raw, None), 5)
            .await
            .unwrap();
        assert_eq!(found, vec![ImageCandidate::new("https://official.example/geto-1.png")]);
    }

    #[test]
    fn test_curated_manifest_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curated.json");
        std::fs::write(
            &path,
            r#"[{"character": "Satoru Gojo", "urls": ["https://official.example/gojo.png"]}]"#,
        )
        .unwrap();

        let provider = CuratedArtProvider::from_path(&path).unwrap();
        assert_eq!(provider.entries.len(), 1);
        assert!(provider.entries[0].series.is_none());

        assert!(CuratedArtProvider::from_path(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_web_search_disabled_without_key() {
        let mut config = WebSearchConfig::default();
        config.enabled = true;
        config.engine_id = Some("engine".into());
        let provider = WebSearchProvider::from_config(
            &config,
            None,
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(provider.is_none());

        let keyed = WebSearchProvider::from_config(
            &config,
            Some("key".into()),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(keyed.is_some());
    }
}
