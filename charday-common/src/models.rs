//! Data model shared across the bot
//!
//! Values progress strictly `RawCharacter` → `CanonicalCharacter` →
//! `DailyPost`; each stage is an immutable value produced by the stage before.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Characters
// ============================================================================

/// Birthday candidate as produced by the birthday-list source
///
/// Names may be misspelled or transliterated differently from the catalog and
/// the series guess may be wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCharacter {
    /// Identifier assigned by the birthday-list source
    pub id: String,
    /// Display name as scraped
    pub name: String,
    /// Series the source believes the character belongs to
    #[serde(default)]
    pub series_name_guess: Option<String>,
    /// Popularity signal used to order slots
    #[serde(default)]
    pub favorites_count: u32,
    /// Birthday label as shown by the source (e.g. "Dec 3")
    #[serde(default)]
    pub birthday_label: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub full_image_url: Option<String>,
}

/// Image variants published by the catalog for a character
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub large: Option<String>,
    pub medium: Option<String>,
}

impl CatalogImage {
    /// Preferred variant: large first, default/medium second
    pub fn preferred(&self) -> Option<&str> {
        self.large
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.medium.as_deref().filter(|u| !u.trim().is_empty()))
    }
}

/// Authoritative character record resolved from the metadata catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCharacter {
    /// Catalog identifier
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub name_native: Option<String>,
    /// Authoritative series title
    pub series_name: String,
    /// Every series title the catalog associates with the character
    #[serde(default)]
    pub series_titles: Vec<String>,
    #[serde(default)]
    pub favorites_count: u32,
    /// Biography; cleared when the match could not be confirmed
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub genre_tags: Vec<String>,
    #[serde(default)]
    pub image: CatalogImage,
    /// `RawCharacter::id` this record was resolved from
    pub source_candidate_id: String,
    /// False when picked by the last-resort global search fallback
    #[serde(default = "default_true")]
    pub verified: bool,
}

fn default_true() -> bool {
    true
}

/// Verified image selected for a character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    /// Local file holding the downloaded image
    pub local_reference: PathBuf,
    /// Name of the provider that supplied the winning candidate
    pub provider_name: String,
    /// Position of that provider in the priority order (1-based)
    pub provider_rank: u8,
    /// URL the image was downloaded from
    pub source_url: String,
}

// ============================================================================
// Daily posts
// ============================================================================

/// Publication status of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Error,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Posted => "posted",
            PostStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PostStatus::Pending),
            "posted" => Some(PostStatus::Posted),
            "error" => Some(PostStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled post for one slot of one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPost {
    pub date: NaiveDate,
    /// Position in the slot table (0 = most favorited)
    pub slot_index: u32,
    /// Stable source-character identifier (`RawCharacter::id`)
    #[serde(default)]
    pub character_id: Option<String>,
    /// Catalog identifier when identity resolution succeeded
    #[serde(default)]
    pub catalog_id: Option<u64>,
    pub character_name: String,
    pub series_name: String,
    pub scheduled_time: DateTime<FixedOffset>,
    #[serde(default)]
    pub preview_text: Option<String>,
    #[serde(default)]
    pub image_reference: Option<PathBuf>,
    #[serde(default)]
    pub image_provider: Option<String>,
    pub status: PostStatus,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub external_post_id: Option<String>,
    #[serde(default)]
    pub external_post_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DailyPost {
    pub fn is_posted(&self) -> bool {
        self.status == PostStatus::Posted
    }

    /// True when the post carries a non-blank source-character identifier
    pub fn has_source_identity(&self) -> bool {
        self.character_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Character dropped from the day, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCharacter {
    pub character_id: String,
    pub character_name: String,
    pub reason: String,
}

/// Persisted record of one day's prepared posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyState {
    pub date: NaiveDate,
    pub prepared_at: DateTime<Utc>,
    #[serde(default)]
    pub posts: Vec<DailyPost>,
    #[serde(default)]
    pub skipped: Vec<SkippedCharacter>,
}

impl DailyState {
    pub fn post(&self, slot_index: u32) -> Option<&DailyPost> {
        self.posts.iter().find(|p| p.slot_index == slot_index)
    }

    pub fn post_mut(&mut self, slot_index: u32) -> Option<&mut DailyPost> {
        self.posts.iter_mut().find(|p| p.slot_index == slot_index)
    }

    /// Count of posts in each status: (pending, posted, error)
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.posts.iter().fold((0, 0, 0), |(pe, po, er), p| match p.status {
            PostStatus::Pending => (pe + 1, po, er),
            PostStatus::Posted => (pe, po + 1, er),
            PostStatus::Error => (pe, po, er + 1),
        })
    }
}
