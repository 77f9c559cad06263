//! Publishing one slot
//!
//! The persisted status is re-read immediately before the posting call; that
//! read is the only protection against a second post for the same slot.
//! The downloaded image is deleted once the attempt completes, whatever the
//! outcome.

use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, warn};

use super::{DailyWorkflow, WorkflowError};
use crate::lifecycle::LifecycleError;
use crate::publish::caption::CaptionInput;

/// Result of one publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Posted {
        external_id: String,
        external_url: String,
    },
    /// The slot was already posted; nothing was sent
    AlreadyPosted,
    /// The attempt failed and the slot is now `error`
    Failed(String),
}

impl DailyWorkflow {
    /// Publish `slot_index` of `date`
    ///
    /// Works for `pending` and `error` slots (manual re-run); state store
    /// failures abort before anything is sent.
    pub async fn publish_slot(
        &self,
        date: NaiveDate,
        slot_index: u32,
    ) -> Result<SlotOutcome, WorkflowError> {
        let state = self
            .lifecycle
            .load_day(date)
            .await?
            .ok_or(LifecycleError::UnknownDay(date))?;
        let post = state
            .post(slot_index)
            .cloned()
            .ok_or(LifecycleError::UnknownSlot { date, slot: slot_index })?;

        if post.is_posted() {
            info!(date = %date, slot = slot_index, "Slot already posted, skipping");
            return Ok(SlotOutcome::AlreadyPosted);
        }

        let Some(image_path) = post.image_reference.clone() else {
            return self.fail(date, slot_index, "no image prepared for slot").await;
        };

        let image = match tokio::fs::read(&image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let reason = format!("image unavailable at {}: {}", image_path.display(), e);
                return self.fail(date, slot_index, &reason).await;
            }
        };

        let text = match &post.preview_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => self.captions.caption(&CaptionInput {
                character_name: &post.character_name,
                series_name: &post.series_name,
                about: None,
            }),
        };

        // Last check before the network call
        if self.lifecycle.is_already_posted(date, slot_index).await? {
            info!(date = %date, slot = slot_index, "Slot posted concurrently, skipping");
            return Ok(SlotOutcome::AlreadyPosted);
        }

        info!(
            date = %date,
            slot = slot_index,
            character = %post.character_name,
            service = self.poster.name(),
            "Publishing slot"
        );

        let outcome = match self.poster.publish(&text, &image).await {
            Ok(receipt) => {
                self.lifecycle
                    .mark_posted(date, slot_index, &receipt.external_id, &receipt.external_url)
                    .await?;
                SlotOutcome::Posted {
                    external_id: receipt.external_id,
                    external_url: receipt.external_url,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                self.lifecycle.mark_failed(date, slot_index, &reason).await?;
                SlotOutcome::Failed(reason)
            }
        };

        remove_image(&image_path).await;
        Ok(outcome)
    }

    async fn fail(
        &self,
        date: NaiveDate,
        slot_index: u32,
        reason: &str,
    ) -> Result<SlotOutcome, WorkflowError> {
        self.lifecycle.mark_failed(date, slot_index, reason).await?;
        Ok(SlotOutcome::Failed(reason.to_string()))
    }
}

async fn remove_image(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Could not remove published image");
    }
}
