//! In-process day runner
//!
//! Recovers or prepares the day, then walks the slots in order, sleeping until
//! each slot's time. Only `pending` slots are published: `error` slots wait for
//! a manual trigger or a fresh preparation, and slots missed by more than the
//! catch-up window are left pending.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, Utc};
use charday_common::PostStatus;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{DailyWorkflow, SlotOutcome, WorkflowError};

/// When a slot should be published relative to now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTiming {
    /// Slot time is still ahead
    Wait(Duration),
    /// Slot time has passed, within the catch-up window
    Due,
    /// Slot time passed longer ago than the catch-up window
    Missed,
}

pub fn slot_timing(
    scheduled: DateTime<FixedOffset>,
    now: DateTime<Utc>,
    catch_up: ChronoDuration,
) -> SlotTiming {
    let until = scheduled.with_timezone(&Utc).signed_duration_since(now);
    if until > ChronoDuration::zero() {
        // Positive chrono durations always convert
        return SlotTiming::Wait(until.to_std().unwrap_or_default());
    }
    if -until > catch_up {
        SlotTiming::Missed
    } else {
        SlotTiming::Due
    }
}

/// What happened to each slot during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub posted: Vec<u32>,
    pub failed: Vec<u32>,
    pub missed: Vec<u32>,
    /// Slots that were not pending when reached (posted or error)
    pub not_pending: Vec<u32>,
}

impl DailyWorkflow {
    /// Publish the day's pending slots at their scheduled times
    pub async fn run_day(
        &self,
        date: NaiveDate,
        catch_up: ChronoDuration,
    ) -> Result<DaySummary, WorkflowError> {
        let state = self.prepare_or_recover(date).await?;
        let mut summary = DaySummary::default();

        let mut slots: Vec<(u32, DateTime<FixedOffset>)> = state
            .posts
            .iter()
            .map(|p| (p.slot_index, p.scheduled_time))
            .collect();
        slots.sort_by_key(|(_, time)| *time);

        for (slot_index, scheduled) in slots {
            // Status may have changed while waiting (manual trigger)
            let current = self
                .lifecycle
                .load_day(date)
                .await?
                .and_then(|s| s.post(slot_index).map(|p| p.status));
            if current != Some(PostStatus::Pending) {
                summary.not_pending.push(slot_index);
                continue;
            }

            match slot_timing(scheduled, Utc::now(), catch_up) {
                SlotTiming::Missed => {
                    warn!(
                        date = %date,
                        slot = slot_index,
                        scheduled = %scheduled,
                        "Slot time missed beyond catch-up window, leaving pending"
                    );
                    summary.missed.push(slot_index);
                    continue;
                }
                SlotTiming::Wait(delay) => {
                    info!(
                        date = %date,
                        slot = slot_index,
                        wait_secs = delay.as_secs(),
                        "Waiting for slot"
                    );
                    tokio::time::sleep(delay).await;
                }
                SlotTiming::Due => {}
            }

            match self.publish_slot(date, slot_index).await? {
                SlotOutcome::Posted { .. } => summary.posted.push(slot_index),
                SlotOutcome::AlreadyPosted => summary.not_pending.push(slot_index),
                SlotOutcome::Failed(_) => summary.failed.push(slot_index),
            }
        }

        info!(
            date = %date,
            posted = summary.posted.len(),
            failed = summary.failed.len(),
            missed = summary.missed.len(),
            "Day run complete"
        );
        Ok(summary)
    }
}
