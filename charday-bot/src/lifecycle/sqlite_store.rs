//! SQLite state store
//!
//! One row per day in `daily_states`, one row per slot in `daily_posts`.
//! Dates are stored as `YYYY-MM-DD` text so range deletes compare lexically.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use charday_common::time::{date_key, parse_date_key};
use charday_common::{DailyPost, DailyState, Error, PostStatus, Result, SkippedCharacter};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use super::StateStore;

/// [`StateStore`] backed by a SQLite database
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if needed) the database file and its tables
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // mode=rwc: read, write, create
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await?;
        Self::new(pool).await
    }

    /// Use an existing pool, creating tables if they don't exist
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_states (
            date TEXT PRIMARY KEY,
            prepared_at TEXT NOT NULL,
            skipped TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_posts (
            date TEXT NOT NULL,
            slot_index INTEGER NOT NULL,
            character_id TEXT,
            catalog_id INTEGER,
            character_name TEXT NOT NULL,
            series_name TEXT NOT NULL,
            scheduled_time TEXT NOT NULL,
            preview_text TEXT,
            image_reference TEXT,
            image_provider TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            posted_at TEXT,
            external_post_id TEXT,
            external_post_url TEXT,
            error_message TEXT,
            PRIMARY KEY (date, slot_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Database tables initialized (daily_states, daily_posts)");

    Ok(())
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

fn post_from_row(date: NaiveDate, row: &SqliteRow) -> Result<DailyPost> {
    let status: String = row.get("status");
    let status = PostStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown post status: {}", status)))?;

    let scheduled_time: String = row.get("scheduled_time");
    let posted_at: Option<String> = row.get("posted_at");
    let posted_at = posted_at
        .map(|v| parse_timestamp("posted_at", &v).map(|dt| dt.with_timezone(&Utc)))
        .transpose()?;

    let catalog_id: Option<i64> = row.get("catalog_id");
    let slot_index: i64 = row.get("slot_index");
    let image_reference: Option<String> = row.get("image_reference");

    Ok(DailyPost {
        date,
        slot_index: slot_index as u32,
        character_id: row.get("character_id"),
        catalog_id: catalog_id.map(|id| id as u64),
        character_name: row.get("character_name"),
        series_name: row.get("series_name"),
        scheduled_time: parse_timestamp("scheduled_time", &scheduled_time)?,
        preview_text: row.get("preview_text"),
        image_reference: image_reference.map(PathBuf::from),
        image_provider: row.get("image_provider"),
        status,
        posted_at,
        external_post_id: row.get("external_post_id"),
        external_post_url: row.get("external_post_url"),
        error_message: row.get("error_message"),
    })
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, date: NaiveDate) -> Result<Option<DailyState>> {
        let key = date_key(date);

        let Some(row) = sqlx::query("SELECT prepared_at, skipped FROM daily_states WHERE date = ?")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let prepared_at: String = row.get("prepared_at");
        let prepared_at = parse_timestamp("prepared_at", &prepared_at)?.with_timezone(&Utc);
        let skipped: String = row.get("skipped");
        let skipped: Vec<SkippedCharacter> = serde_json::from_str(&skipped)?;

        let rows = sqlx::query("SELECT * FROM daily_posts WHERE date = ? ORDER BY slot_index")
            .bind(&key)
            .fetch_all(&self.pool)
            .await?;

        let posts = rows
            .iter()
            .map(|row| post_from_row(date, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(DailyState {
            date,
            prepared_at,
            posts,
            skipped,
        }))
    }

    async fn save(&self, state: &DailyState) -> Result<()> {
        // Prepare all data before opening the transaction
        let key = date_key(state.date);
        let prepared_at = state.prepared_at.to_rfc3339();
        let skipped = serde_json::to_string(&state.skipped)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO daily_states (date, prepared_at, skipped) VALUES (?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                prepared_at = excluded.prepared_at,
                skipped = excluded.skipped
            "#,
        )
        .bind(&key)
        .bind(&prepared_at)
        .bind(&skipped)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM daily_posts WHERE date = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        for post in &state.posts {
            sqlx::query(
                r#"
                INSERT INTO daily_posts (
                    date, slot_index, character_id, catalog_id, character_name,
                    series_name, scheduled_time, preview_text, image_reference,
                    image_provider, status, posted_at, external_post_id,
                    external_post_url, error_message
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&key)
            .bind(post.slot_index as i64)
            .bind(&post.character_id)
            .bind(post.catalog_id.map(|id| id as i64))
            .bind(&post.character_name)
            .bind(&post.series_name)
            .bind(post.scheduled_time.to_rfc3339())
            .bind(&post.preview_text)
            .bind(
                post.image_reference
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )
            .bind(&post.image_provider)
            .bind(post.status.as_str())
            .bind(post.posted_at.map(|dt| dt.to_rfc3339()))
            .bind(&post.external_post_id)
            .bind(&post.external_post_url)
            .bind(&post.error_message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let key = date_key(cutoff);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM daily_posts WHERE date < ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM daily_states WHERE date < ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT date FROM daily_states ORDER BY date DESC")
                .fetch_all(&self.pool)
                .await?;
        keys.iter().map(|k| parse_date_key(k)).collect()
    }
}
