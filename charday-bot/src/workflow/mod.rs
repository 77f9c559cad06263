//! Daily workflow
//!
//! Wires the stages together:
//! 1. **prepare**: birthday source → resolver → image pipeline → `initialize_day`
//! 2. **publish_slot**: idempotency guard → posting service → `mark_posted`/`mark_failed`
//! 3. **run_day**: recover or prepare, then publish each pending slot at its time
//!
//! Housekeeping (state retention) lives beside the workflow, not inside the
//! lifecycle.

pub mod housekeeping;
pub mod prepare;
pub mod publisher;
pub mod schedule;

use std::sync::Arc;
use thiserror::Error;

use crate::images::ImagePipeline;
use crate::lifecycle::{DailyPostLifecycle, LifecycleError};
use crate::publish::{CaptionWriter, PostingService};
use crate::resolver::CharacterResolver;
use crate::source::{BirthdaySource, SourceError};

pub use housekeeping::Housekeeper;
pub use publisher::SlotOutcome;
pub use schedule::{slot_timing, DaySummary, SlotTiming};

/// Workflow errors; each aborts the operation it came from
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Birthday source error: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Every collaborator the daily workflow needs
pub struct DailyWorkflow {
    source: Arc<dyn BirthdaySource>,
    resolver: Arc<CharacterResolver>,
    images: Arc<ImagePipeline>,
    lifecycle: Arc<DailyPostLifecycle>,
    poster: Arc<dyn PostingService>,
    captions: Arc<dyn CaptionWriter>,
}

impl DailyWorkflow {
    pub fn new(
        source: Arc<dyn BirthdaySource>,
        resolver: Arc<CharacterResolver>,
        images: Arc<ImagePipeline>,
        lifecycle: Arc<DailyPostLifecycle>,
        poster: Arc<dyn PostingService>,
        captions: Arc<dyn CaptionWriter>,
    ) -> Self {
        Self {
            source,
            resolver,
            images,
            lifecycle,
            poster,
            captions,
        }
    }

    pub fn lifecycle(&self) -> &Arc<DailyPostLifecycle> {
        &self.lifecycle
    }
}
