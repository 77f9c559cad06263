//! Birthday-list source
//!
//! The scraper runs outside this process and drops one JSON array of
//! [`RawCharacter`] per day into the candidates directory as `YYYY-MM-DD.json`.

use async_trait::async_trait;
use chrono::NaiveDate;
use charday_common::time::date_key;
use charday_common::RawCharacter;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No candidate list for {date} at {path}")]
    Missing { date: NaiveDate, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed candidate list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Characters whose birthday falls on a date
#[async_trait]
pub trait BirthdaySource: Send + Sync {
    /// Unordered; the caller sorts by popularity
    async fn list_candidates(&self, date: NaiveDate) -> Result<Vec<RawCharacter>, SourceError>;
}

/// Reads `<dir>/YYYY-MM-DD.json`
#[derive(Debug, Clone)]
pub struct JsonFileBirthdaySource {
    dir: PathBuf,
}

impl JsonFileBirthdaySource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date_key(date)))
    }
}

#[async_trait]
impl BirthdaySource for JsonFileBirthdaySource {
    async fn list_candidates(&self, date: NaiveDate) -> Result<Vec<RawCharacter>, SourceError> {
        let path = self.path_for(date);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::Missing { date, path });
            }
            Err(e) => return Err(e.into()),
        };

        let candidates: Vec<RawCharacter> = serde_json::from_str(&content)?;
        // Entries without a usable identity or name cannot be scheduled
        let candidates: Vec<RawCharacter> = candidates
            .into_iter()
            .filter(|c| !c.id.trim().is_empty() && !c.name.trim().is_empty())
            .collect();

        debug!(date = %date, count = candidates.len(), "Loaded birthday candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("2024-02-03.json"),
            r#"[
                {"id": "1", "name": "Suguru Geto", "series_name_guess": "Jujutsu Kaisen", "favorites_count": 900},
                {"id": "", "name": "No identity"},
                {"id": "2", "name": "Setsuna F. Seiei", "favorites_count": 40}
            ]"#,
        )
        .unwrap();

        let source = JsonFileBirthdaySource::new(dir.path().to_path_buf());
        let found = source
            .list_candidates(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].favorites_count, 900);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileBirthdaySource::new(dir.path().to_path_buf());
        let err = source
            .list_candidates(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Missing { .. }));
    }
}
