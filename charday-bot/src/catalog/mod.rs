//! Metadata catalog contract
//!
//! The catalog is the authoritative source mapping character and series names
//! to structured records. The resolver only depends on [`MetadataCatalog`];
//! [`anilist::AniListClient`] is the production implementation.

pub mod anilist;

use async_trait::async_trait;
use charday_common::CatalogImage;
use std::time::Duration;
use thiserror::Error;

use crate::utils::Retryable;

pub use anilist::AniListClient;

/// Series found by title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSeries {
    pub id: u64,
    pub title: String,
}

/// Character as listed in a roster or search result
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogMember {
    pub id: u64,
    pub name: String,
    pub alternative_names: Vec<String>,
    /// Series the catalog lists the character in (may be empty in rosters)
    pub series_titles: Vec<String>,
    pub favorites: u32,
}

impl CatalogMember {
    /// Primary name followed by alternatives
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.alternative_names.iter().map(|s| s.as_str()))
    }
}

/// Full character record including biography and genres
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogRecord {
    pub id: u64,
    pub name: String,
    pub name_native: Option<String>,
    /// Most popular series first
    pub series_titles: Vec<String>,
    pub about: Option<String>,
    pub genres: Vec<String>,
    pub favorites: u32,
    pub image: CatalogImage,
}

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Retryable for CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Network(_) | CatalogError::RateLimited { .. } => true,
            CatalogError::Api(status, _) => *status >= 500,
            CatalogError::Parse(_) | CatalogError::NotFound(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Read-only access to the metadata catalog
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// Catalog name for logging
    fn name(&self) -> &'static str;

    /// Look up a series by (possibly inexact) title
    async fn find_series(&self, title: &str) -> Result<Option<CatalogSeries>, CatalogError>;

    /// Full character roster of one series
    async fn list_roster(&self, series_id: u64) -> Result<Vec<CatalogMember>, CatalogError>;

    /// Global character search, at most `limit` results, best match first
    async fn search_characters(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CatalogMember>, CatalogError>;

    /// Full record (biography, genres, images) of one character
    async fn get_full_record(&self, character_id: u64) -> Result<CatalogRecord, CatalogError>;
}
