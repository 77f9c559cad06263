//! Daily post lifecycle
//!
//! Owns the per-day [`DailyState`] record and every status transition of its
//! posts:
//!
//! ```text
//! pending ──► posted   (terminal)
//!    │
//!    └──────► error ──► pending   (only through a fresh initialize_day merge)
//! ```
//!
//! At-most-once delivery rests entirely on the persisted status: a posted slot
//! is never overwritten, and [`DailyPostLifecycle::is_already_posted`] is read
//! right before every posting call. There is no locking.

pub mod json_store;
pub mod sqlite_store;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc};
use charday_common::time::slot_datetime;
use charday_common::{DailyPost, DailyState, PostStatus, SkippedCharacter};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use json_store::JsonStateStore;
pub use sqlite_store::SqliteStateStore;

/// Skip reason for prepared characters that found no free slot
pub const NO_FREE_SLOT_REASON: &str = "no free slot";

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// State store could not be read or written; the operation must abort
    #[error("State store error: {0}")]
    Store(#[from] charday_common::Error),

    #[error("No state prepared for {0}")]
    UnknownDay(NaiveDate),

    #[error("No slot {slot} on {date}")]
    UnknownSlot { date: NaiveDate, slot: u32 },
}

/// Persistence contract for daily state
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, date: NaiveDate) -> charday_common::Result<Option<DailyState>>;

    async fn save(&self, state: &DailyState) -> charday_common::Result<()>;

    /// Delete every day strictly before `cutoff`, returning how many were removed
    async fn prune_before(&self, cutoff: NaiveDate) -> charday_common::Result<usize>;

    /// Dates with persisted state, newest first
    async fn list_dates(&self) -> charday_common::Result<Vec<NaiveDate>>;
}

/// Character prepared for one slot
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPost {
    /// Stable source identifier (`RawCharacter::id`)
    pub character_id: String,
    pub catalog_id: Option<u64>,
    pub character_name: String,
    pub series_name: String,
    pub preview_text: Option<String>,
    pub image_reference: Option<PathBuf>,
    pub image_provider: Option<String>,
}

/// State machine over a [`StateStore`]
pub struct DailyPostLifecycle {
    store: Arc<dyn StateStore>,
    slot_times: Vec<NaiveTime>,
    offset: FixedOffset,
}

impl DailyPostLifecycle {
    pub fn new(store: Arc<dyn StateStore>, slot_times: Vec<NaiveTime>, offset: FixedOffset) -> Self {
        Self {
            store,
            slot_times,
            offset,
        }
    }

    pub fn slot_times(&self) -> &[NaiveTime] {
        &self.slot_times
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub async fn load_day(&self, date: NaiveDate) -> Result<Option<DailyState>, LifecycleError> {
        Ok(self.store.load(date).await?)
    }

    /// Create the day's state, or merge fresh preparation into an existing one
    ///
    /// Posted slots are kept untouched and never consume a fresh entry. Fresh
    /// entries whose character is already posted are dropped, and the rest
    /// fill the remaining slot indexes in order as `pending`. Entries left
    /// over once every slot is taken are recorded as skipped.
    pub async fn initialize_day(
        &self,
        date: NaiveDate,
        prepared: Vec<PreparedPost>,
        skipped: Vec<SkippedCharacter>,
    ) -> Result<DailyState, LifecycleError> {
        let mut skipped = skipped;

        let existing = self.store.load(date).await?;
        let mut existing_posts = existing.map(|s| s.posts).unwrap_or_default();

        let posted_ids: HashSet<String> = existing_posts
            .iter()
            .filter(|p| p.is_posted())
            .filter_map(|p| p.character_id.clone())
            .collect();

        let mut fresh = prepared.into_iter().filter(|entry| {
            let already = posted_ids.contains(&entry.character_id);
            if already {
                debug!(
                    date = %date,
                    character = %entry.character_name,
                    "Character already posted today, not scheduling again"
                );
            }
            !already
        });

        let mut posts = Vec::with_capacity(self.slot_times.len());

        for (index, time) in self.slot_times.iter().enumerate() {
            let slot_index = index as u32;

            if let Some(pos) = existing_posts
                .iter()
                .position(|p| p.slot_index == slot_index && p.is_posted())
            {
                info!(date = %date, slot = slot_index, "Slot already posted, keeping it");
                posts.push(existing_posts.swap_remove(pos));
                continue;
            }

            let Some(entry) = fresh.next() else {
                continue;
            };

            posts.push(DailyPost {
                date,
                slot_index,
                character_id: Some(entry.character_id),
                catalog_id: entry.catalog_id,
                character_name: entry.character_name,
                series_name: entry.series_name,
                scheduled_time: slot_datetime(date, *time, self.offset),
                preview_text: entry.preview_text,
                image_reference: entry.image_reference,
                image_provider: entry.image_provider,
                status: PostStatus::Pending,
                posted_at: None,
                external_post_id: None,
                external_post_url: None,
                error_message: None,
            });
        }

        for entry in fresh {
            warn!(
                date = %date,
                character = %entry.character_name,
                "Every slot is taken, character not scheduled"
            );
            skipped.push(SkippedCharacter {
                character_id: entry.character_id,
                character_name: entry.character_name,
                reason: NO_FREE_SLOT_REASON.to_string(),
            });
        }

        // Posted slots outside the current slot table are never dropped
        posts.extend(existing_posts.into_iter().filter(|p| p.is_posted()));
        posts.sort_by_key(|p| p.slot_index);

        let state = DailyState {
            date,
            prepared_at: Utc::now(),
            posts,
            skipped,
        };
        self.store.save(&state).await?;

        let (pending, posted, error) = state.status_counts();
        info!(date = %date, pending, posted, error, skipped = state.skipped.len(), "Day initialized");

        Ok(state)
    }

    /// Whether the persisted day can be reused instead of preparing again
    ///
    /// Requires at least one post, and a source identifier on every post.
    pub async fn can_recover(&self, date: NaiveDate) -> Result<bool, LifecycleError> {
        Ok(match self.store.load(date).await? {
            Some(state) => {
                !state.posts.is_empty() && state.posts.iter().all(|p| p.has_source_identity())
            }
            None => false,
        })
    }

    /// Idempotency guard consulted right before every posting call
    pub async fn is_already_posted(
        &self,
        date: NaiveDate,
        slot_index: u32,
    ) -> Result<bool, LifecycleError> {
        Ok(self
            .store
            .load(date)
            .await?
            .and_then(|s| s.post(slot_index).map(|p| p.is_posted()))
            .unwrap_or(false))
    }

    /// Record a confirmed publication; calling it again is a logged no-op
    pub async fn mark_posted(
        &self,
        date: NaiveDate,
        slot_index: u32,
        external_post_id: &str,
        external_post_url: &str,
    ) -> Result<(), LifecycleError> {
        let mut state = self.load_existing(date).await?;
        let post = state
            .post_mut(slot_index)
            .ok_or(LifecycleError::UnknownSlot { date, slot: slot_index })?;

        if post.is_posted() {
            warn!(
                date = %date,
                slot = slot_index,
                external_post_id = post.external_post_id.as_deref().unwrap_or(""),
                "Slot already marked posted, ignoring"
            );
            return Ok(());
        }

        post.status = PostStatus::Posted;
        post.posted_at = Some(Utc::now());
        post.external_post_id = Some(external_post_id.to_string());
        post.external_post_url = Some(external_post_url.to_string());
        post.error_message = None;

        self.store.save(&state).await?;
        info!(date = %date, slot = slot_index, external_post_id, "Slot posted");
        Ok(())
    }

    /// Record a failed publication, keeping the image reference
    pub async fn mark_failed(
        &self,
        date: NaiveDate,
        slot_index: u32,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        let mut state = self.load_existing(date).await?;
        let post = state
            .post_mut(slot_index)
            .ok_or(LifecycleError::UnknownSlot { date, slot: slot_index })?;

        if post.is_posted() {
            warn!(date = %date, slot = slot_index, reason, "Slot is posted, failure ignored");
            return Ok(());
        }

        post.status = PostStatus::Error;
        post.error_message = Some(reason.to_string());

        self.store.save(&state).await?;
        warn!(date = %date, slot = slot_index, reason, "Slot failed");
        Ok(())
    }

    async fn load_existing(&self, date: NaiveDate) -> Result<DailyState, LifecycleError> {
        self.store
            .load(date)
            .await?
            .ok_or(LifecycleError::UnknownDay(date))
    }
}
