//! Daily preparation
//!
//! Characters are processed strictly in descending-favorites order (ties by
//! source id), so slot 0 always holds the most favorited publishable
//! character. A character without a publishable image is recorded as skipped
//! and the next one takes its place.

use chrono::NaiveDate;
use charday_common::{DailyState, RawCharacter, SkippedCharacter};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{DailyWorkflow, WorkflowError};
use crate::lifecycle::PreparedPost;
use crate::publish::caption::CaptionInput;

/// Skip reason recorded for characters without a valid image
pub const NO_IMAGE_REASON: &str = "no publishable image";

/// Popularity order used to fill slots
pub fn sort_by_popularity(candidates: &mut [RawCharacter]) {
    candidates.sort_by(|a, b| {
        b.favorites_count
            .cmp(&a.favorites_count)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl DailyWorkflow {
    /// Build (or merge) the day's posts from the birthday source
    pub async fn prepare(&self, date: NaiveDate) -> Result<DailyState, WorkflowError> {
        let mut candidates = self.source.list_candidates(date).await?;
        sort_by_popularity(&mut candidates);

        let slot_count = self.lifecycle.slot_times().len();
        info!(date = %date, candidates = candidates.len(), slots = slot_count, "Preparing day");

        let existing = self.lifecycle.load_day(date).await?;

        // Characters already posted today keep their slots; only the rest are filled
        let posted_ids: HashSet<String> = existing
            .iter()
            .flat_map(|s| s.posts.iter())
            .filter(|p| p.is_posted())
            .filter_map(|p| p.character_id.clone())
            .collect();
        let posted_slots = existing
            .iter()
            .flat_map(|s| s.posts.iter())
            .filter(|p| p.is_posted() && (p.slot_index as usize) < slot_count)
            .count();
        let free_slots = slot_count.saturating_sub(posted_slots);

        // Image references of the state being replaced, for cleanup below
        let previous_images: Vec<PathBuf> = existing
            .map(|s| {
                s.posts
                    .into_iter()
                    .filter(|p| !p.is_posted())
                    .filter_map(|p| p.image_reference)
                    .collect()
            })
            .unwrap_or_default();

        let mut prepared: Vec<PreparedPost> = Vec::with_capacity(free_slots);
        let mut skipped: Vec<SkippedCharacter> = Vec::new();

        for raw in &candidates {
            if prepared.len() >= free_slots {
                break;
            }
            if posted_ids.contains(&raw.id) {
                debug!(character = %raw.name, id = %raw.id, "Already posted today");
                continue;
            }

            let canonical = self.resolver.resolve(raw).await;

            let Some(image) = self.images.resolve(raw, canonical.as_ref()).await else {
                warn!(character = %raw.name, id = %raw.id, "Skipping character: {}", NO_IMAGE_REASON);
                skipped.push(SkippedCharacter {
                    character_id: raw.id.clone(),
                    character_name: raw.name.clone(),
                    reason: NO_IMAGE_REASON.to_string(),
                });
                continue;
            };

            // Resolution failure falls back to the source's own fields
            let (character_name, series_name, about, catalog_id) = match &canonical {
                Some(c) => (c.name.clone(), c.series_name.clone(), c.about.clone(), Some(c.id)),
                None => (
                    raw.name.clone(),
                    raw.series_name_guess.clone().unwrap_or_default(),
                    None,
                    None,
                ),
            };

            let preview_text = self.captions.caption(&CaptionInput {
                character_name: &character_name,
                series_name: &series_name,
                about: about.as_deref(),
            });

            info!(
                slot = prepared.len(),
                character = %character_name,
                series = %series_name,
                provider = %image.provider_name,
                "Character prepared"
            );

            prepared.push(PreparedPost {
                character_id: raw.id.clone(),
                catalog_id,
                character_name,
                series_name,
                preview_text: Some(preview_text),
                image_reference: Some(image.local_reference),
                image_provider: Some(image.provider_name),
            });
        }

        let fresh_images: Vec<PathBuf> = prepared
            .iter()
            .filter_map(|p| p.image_reference.clone())
            .collect();

        let state = self.lifecycle.initialize_day(date, prepared, skipped).await?;

        discard_unreferenced(previous_images.into_iter().chain(fresh_images), &state).await;

        Ok(state)
    }

    /// Reuse the persisted day when it is recoverable, otherwise prepare it
    pub async fn prepare_or_recover(&self, date: NaiveDate) -> Result<DailyState, WorkflowError> {
        if self.lifecycle.can_recover(date).await? {
            if let Some(state) = self.lifecycle.load_day(date).await? {
                let (pending, posted, error) = state.status_counts();
                info!(date = %date, pending, posted, error, "Recovered prepared day");
                return Ok(state);
            }
        }

        self.prepare(date).await
    }
}

/// Delete downloaded images that the final state no longer references
async fn discard_unreferenced(paths: impl Iterator<Item = PathBuf>, state: &DailyState) {
    let referenced: HashSet<&PathBuf> = state
        .posts
        .iter()
        .filter_map(|p| p.image_reference.as_ref())
        .collect();

    for path in paths {
        if referenced.contains(&path) {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Could not remove unused image");
            }
        }
    }
}
