//! JSON file state store
//!
//! One pretty-printed `YYYY-MM-DD.json` file per day in the state directory.
//! Saves go through a temporary file and a rename.

use async_trait::async_trait;
use chrono::NaiveDate;
use charday_common::time::{date_key, parse_date_key};
use charday_common::{DailyState, Result};
use std::path::PathBuf;
use tracing::debug;

use super::StateStore;

/// [`StateStore`] writing one JSON file per day
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date_key(date)))
    }

    /// Dates of every state file in the directory (unordered)
    async fn stored_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dates),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = parse_date_key(stem) {
                dates.push(date);
            }
        }

        Ok(dates)
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self, date: NaiveDate) -> Result<Option<DailyState>> {
        let path = self.path_for(date);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, state: &DailyState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(state.date);
        let temp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)?;

        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, &path).await?;

        debug!(path = %path.display(), "State saved");
        Ok(())
    }

    async fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut removed = 0;
        for date in self.stored_dates().await? {
            if date < cutoff {
                tokio::fs::remove_file(self.path_for(date)).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates = self.stored_dates().await?;
        dates.sort_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}
