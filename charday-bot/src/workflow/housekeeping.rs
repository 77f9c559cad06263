//! State retention
//!
//! Deletes persisted days older than the retention window. Runs separately
//! from the lifecycle so the lifecycle never deletes anything.

use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::info;

use crate::lifecycle::{LifecycleError, StateStore};

/// Default retention window in days
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

pub struct Housekeeper {
    store: Arc<dyn StateStore>,
    retention_days: u32,
}

impl Housekeeper {
    pub fn new(store: Arc<dyn StateStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days: retention_days.max(1),
        }
    }

    /// First date kept when pruning on `today`
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Remove every day before the cutoff, returning how many were removed
    pub async fn prune(&self, today: NaiveDate) -> Result<usize, LifecycleError> {
        let cutoff = self.cutoff(today);
        let removed = self.store.prune_before(cutoff).await?;
        info!(cutoff = %cutoff, removed, "Pruned old daily state");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::JsonStateStore;
    use chrono::Utc;
    use charday_common::DailyState;

    #[test]
    fn test_cutoff_keeps_retention_window() {
        let store = Arc::new(JsonStateStore::new(std::env::temp_dir()));
        let keeper = Housekeeper::new(store, DEFAULT_RETENTION_DAYS);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(keeper.cutoff(today), NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStateStore::new(dir.path().to_path_buf()));
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        for back in 0..10u64 {
            let date = today.checked_sub_days(Days::new(back)).unwrap();
            store
                .save(&DailyState {
                    date,
                    prepared_at: Utc::now(),
                    posts: vec![],
                    skipped: vec![],
                })
                .await
                .unwrap();
        }

        let keeper = Housekeeper::new(store.clone(), 7);
        assert_eq!(keeper.prune(today).await.unwrap(), 2);
        assert_eq!(store.list_dates().await.unwrap().len(), 8);
    }
}
