//! AniList GraphQL catalog client
//!
//! Implements [`MetadataCatalog`] against the AniList GraphQL API.
//! Requests are spaced by a per-instance courtesy limiter; HTTP 429 maps to
//! [`CatalogError::RateLimited`] carrying the `Retry-After` hint.

use async_trait::async_trait;
use charday_common::config::CatalogConfig;
use charday_common::CatalogImage;
use governor::DefaultDirectRateLimiter;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{CatalogError, CatalogMember, CatalogRecord, CatalogSeries, MetadataCatalog};
use crate::utils::courtesy_limiter;

const USER_AGENT: &str = concat!("charday-bot/", env!("CARGO_PKG_VERSION"));

/// Roster pages fetched at most (50 characters per page)
const MAX_ROSTER_PAGES: u32 = 10;

const FIND_SERIES_QUERY: &str = r#"
query ($search: String) {
  Media(search: $search, type: ANIME) {
    id
    title { romaji english }
  }
}"#;

const ROSTER_QUERY: &str = r#"
query ($id: Int, $page: Int) {
  Media(id: $id) {
    title { romaji english }
    characters(page: $page, perPage: 50, sort: [ROLE, FAVOURITES_DESC]) {
      pageInfo { hasNextPage }
      nodes { id name { full native alternative } favourites }
    }
  }
}"#;

const SEARCH_QUERY: &str = r#"
query ($search: String, $perPage: Int) {
  Page(perPage: $perPage) {
    characters(search: $search, sort: SEARCH_MATCH) {
      id
      name { full native alternative }
      favourites
      media(perPage: 5, sort: POPULARITY_DESC) { nodes { title { romaji english } } }
    }
  }
}"#;

const CHARACTER_QUERY: &str = r#"
query ($id: Int) {
  Character(id: $id) {
    id
    name { full native alternative }
    description(asHtml: false)
    favourites
    image { large medium }
    media(perPage: 10, sort: POPULARITY_DESC) {
      nodes { title { romaji english } genres }
    }
  }
}"#;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
}

impl MediaTitle {
    /// Display title: English when known, romaji otherwise
    fn display(&self) -> Option<String> {
        self.english
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.romaji.clone().filter(|t| !t.trim().is_empty()))
    }

    /// Every distinct spelling, display title first
    fn variants(&self) -> Vec<String> {
        let mut out = Vec::new();
        for title in [&self.english, &self.romaji].into_iter().flatten() {
            if !title.trim().is_empty() && !out.contains(title) {
                out.push(title.clone());
            }
        }
        out
    }
}

#[derive(Debug, Default, Deserialize)]
struct CharacterName {
    full: Option<String>,
    native: Option<String>,
    #[serde(default)]
    alternative: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    #[serde(default)]
    title: MediaTitle,
    #[serde(default)]
    genres: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MediaConnection {
    #[serde(default)]
    nodes: Vec<MediaNode>,
}

#[derive(Debug, Deserialize)]
struct ImageNode {
    large: Option<String>,
    medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CharacterNode {
    id: u64,
    #[serde(default)]
    name: CharacterName,
    #[serde(default)]
    favourites: Option<u32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<ImageNode>,
    #[serde(default)]
    media: Option<MediaConnection>,
}

#[derive(Debug, Deserialize)]
struct SeriesNode {
    id: u64,
    #[serde(default)]
    title: MediaTitle,
}

#[derive(Debug, Deserialize)]
struct FindSeriesData {
    #[serde(rename = "Media")]
    media: Option<SeriesNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterPage {
    page_info: Option<PageInfo>,
    #[serde(default)]
    nodes: Vec<CharacterNode>,
}

#[derive(Debug, Deserialize)]
struct RosterMedia {
    #[serde(default)]
    title: MediaTitle,
    characters: Option<RosterPage>,
}

#[derive(Debug, Deserialize)]
struct RosterData {
    #[serde(rename = "Media")]
    media: Option<RosterMedia>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    characters: Vec<CharacterNode>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(rename = "Page")]
    page: Option<SearchPage>,
}

#[derive(Debug, Deserialize)]
struct CharacterData {
    #[serde(rename = "Character")]
    character: Option<CharacterNode>,
}

// ============================================================================
// Conversions
// ============================================================================

impl CharacterNode {
    fn series_titles(&self) -> Vec<String> {
        let mut titles = Vec::new();
        if let Some(media) = &self.media {
            for node in &media.nodes {
                for title in node.title.variants() {
                    if !titles.contains(&title) {
                        titles.push(title);
                    }
                }
            }
        }
        titles
    }

    fn into_member(self, roster_titles: &[String]) -> CatalogMember {
        let mut series_titles = self.series_titles();
        for title in roster_titles {
            if !series_titles.contains(title) {
                series_titles.push(title.clone());
            }
        }

        CatalogMember {
            id: self.id,
            name: self.name.full.clone().unwrap_or_default(),
            alternative_names: self.name.alternative.clone().unwrap_or_default(),
            series_titles,
            favorites: self.favourites.unwrap_or(0),
        }
    }

    fn into_record(self) -> CatalogRecord {
        let series_titles = self.series_titles();

        let mut genres: Vec<String> = Vec::new();
        if let Some(media) = &self.media {
            for genre in media.nodes.iter().filter_map(|n| n.genres.as_ref()).flatten() {
                if !genres.contains(genre) {
                    genres.push(genre.clone());
                }
            }
        }

        let image = self
            .image
            .map(|i| CatalogImage {
                large: i.large,
                medium: i.medium,
            })
            .unwrap_or_default();

        CatalogRecord {
            id: self.id,
            name: self.name.full.unwrap_or_default(),
            name_native: self.name.native,
            series_titles,
            about: self.description.as_deref().and_then(clean_about),
            genres,
            favorites: self.favourites.unwrap_or(0),
            image,
        }
    }
}

/// Strip spoiler blocks and markup from a biography
pub fn clean_about(raw: &str) -> Option<String> {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;

    // Spoilers are wrapped as ~!...!~
    while let Some(start) = rest.find("~!") {
        text.push_str(&rest[..start]);
        match rest[start + 2..].find("!~") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
            }
        }
    }
    text.push_str(rest);

    let text = text
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("__", "");

    let cleaned = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

// ============================================================================
// Client
// ============================================================================

/// AniList API client
pub struct AniListClient {
    http_client: reqwest::Client,
    endpoint: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl AniListClient {
    /// Create a client from catalog settings
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            rate_limiter: courtesy_limiter(Duration::from_millis(config.request_interval_ms)),
        })
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, CatalogError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(header::ACCEPT, "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CatalogError::RateLimited { retry_after });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(variables.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api(status.as_u16(), body));
        }

        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        match envelope.data {
            Some(data) => Ok(data),
            None => {
                let errors = envelope.errors.unwrap_or_default();
                if errors.iter().any(|e| e.status == Some(404)) {
                    return Err(CatalogError::NotFound(variables.to_string()));
                }
                let message = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(CatalogError::Parse(format!("response carried no data: {}", message)))
            }
        }
    }
}

#[async_trait]
impl MetadataCatalog for AniListClient {
    fn name(&self) -> &'static str {
        "AniList"
    }

    async fn find_series(&self, title: &str) -> Result<Option<CatalogSeries>, CatalogError> {
        debug!(title = %title, "Looking up series");

        let data: FindSeriesData =
            match self.graphql(FIND_SERIES_QUERY, json!({ "search": title })).await {
                Ok(data) => data,
                Err(CatalogError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            };

        Ok(data.media.and_then(|m| {
            m.title.display().map(|title| CatalogSeries { id: m.id, title })
        }))
    }

    async fn list_roster(&self, series_id: u64) -> Result<Vec<CatalogMember>, CatalogError> {
        let mut members = Vec::new();

        for page in 1..=MAX_ROSTER_PAGES {
            let data: RosterData = self
                .graphql(ROSTER_QUERY, json!({ "id": series_id, "page": page }))
                .await?;

            let Some(media) = data.media else {
                break;
            };
            let roster_titles = media.title.variants();
            let Some(characters) = media.characters else {
                break;
            };

            let has_next = characters
                .page_info
                .as_ref()
                .map(|p| p.has_next_page)
                .unwrap_or(false);

            members.extend(
                characters
                    .nodes
                    .into_iter()
                    .map(|node| node.into_member(&roster_titles)),
            );

            if !has_next {
                break;
            }
        }

        debug!(series_id, count = members.len(), "Fetched series roster");
        Ok(members)
    }

    async fn search_characters(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CatalogMember>, CatalogError> {
        let data: SearchData = self
            .graphql(SEARCH_QUERY, json!({ "search": query, "perPage": limit }))
            .await?;

        let results: Vec<CatalogMember> = data
            .page
            .map(|p| p.characters)
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .map(|node| node.into_member(&[]))
            .collect();

        debug!(query = %query, count = results.len(), "Global character search");
        Ok(results)
    }

    async fn get_full_record(&self, character_id: u64) -> Result<CatalogRecord, CatalogError> {
        let data: CharacterData = self
            .graphql(CHARACTER_QUERY, json!({ "id": character_id }))
            .await?;

        data.character
            .map(CharacterNode::into_record)
            .ok_or_else(|| CatalogError::NotFound(format!("character {}", character_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHARACTER_JSON: &str = r#"{
      "data": {
        "Character": {
          "id": 164471,
          "name": { "full": "Suguru Getou", "native": "夏油傑", "alternative": ["Geto"] },
          "description": "A __special grade__ sorcerer.<br>~!He defects.!~ Former student.",
          "favourites": 15000,
          "image": { "large": "https://img.example/large.png", "medium": "https://img.example/medium.png" },
          "media": { "nodes": [
            { "title": { "romaji": "Jujutsu Kaisen", "english": "JUJUTSU KAISEN" }, "genres": ["Action", "Supernatural"] },
            { "title": { "romaji": "Gekijouban Jujutsu Kaisen 0", "english": null }, "genres": ["Action", "Drama"] }
          ] }
        }
      }
    }"#;

    #[test]
    fn test_character_record_conversion() {
        let envelope: GraphQlResponse<CharacterData> = serde_json::from_str(CHARACTER_JSON).unwrap();
        let record = envelope.data.unwrap().character.unwrap().into_record();

        assert_eq!(record.id, 164471);
        assert_eq!(record.name, "Suguru Getou");
        assert_eq!(record.name_native.as_deref(), Some("夏油傑"));
        assert_eq!(
            record.series_titles,
            vec!["JUJUTSU KAISEN", "Jujutsu Kaisen", "Gekijouban Jujutsu Kaisen 0"]
        );
        assert_eq!(record.genres, vec!["Action", "Supernatural", "Drama"]);
        assert_eq!(record.image.preferred(), Some("https://img.example/large.png"));
        assert_eq!(
            record.about.as_deref(),
            Some("A special grade sorcerer.\nFormer student.")
        );
    }

    #[test]
    fn test_roster_member_inherits_series_title() {
        let node: CharacterNode = serde_json::from_str(
            r#"{ "id": 1, "name": { "full": "Yuuji Itadori", "alternative": null }, "favourites": 90 }"#,
        )
        .unwrap();
        let member = node.into_member(&["Jujutsu Kaisen".to_string()]);
        assert_eq!(member.name, "Yuuji Itadori");
        assert!(member.alternative_names.is_empty());
        assert_eq!(member.series_titles, vec!["Jujutsu Kaisen"]);
        assert_eq!(member.favorites, 90);
    }

    #[test]
    fn test_media_title_display_prefers_english() {
        let title = MediaTitle {
            romaji: Some("Shingeki no Kyojin".into()),
            english: Some("Attack on Titan".into()),
        };
        assert_eq!(title.display().as_deref(), Some("Attack on Titan"));

        let romaji_only = MediaTitle {
            romaji: Some("Shingeki no Kyojin".into()),
            english: None,
        };
        assert_eq!(romaji_only.display().as_deref(), Some("Shingeki no Kyojin"));
        assert_eq!(MediaTitle::default().display(), None);
    }

    #[test]
    fn test_clean_about_strips_spoilers_and_markup() {
        assert_eq!(
            clean_about("Kind.<br>~!Secret!~<br>__Strong__").as_deref(),
            Some("Kind.\nStrong")
        );
        assert_eq!(clean_about("~!only spoiler!~"), None);
        assert_eq!(clean_about("Unclosed ~!spoiler").as_deref(), Some("Unclosed"));
    }

    #[test]
    fn test_missing_data_reports_errors() {
        let envelope: GraphQlResponse<CharacterData> = serde_json::from_str(
            r#"{ "data": null, "errors": [{ "message": "Not Found.", "status": 404 }] }"#,
        )
        .unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.errors.unwrap()[0].status, Some(404));
    }

    #[test]
    fn test_client_creation() {
        let client = AniListClient::new(&CatalogConfig::default());
        assert!(client.is_ok());
    }
}
