//! Character identity resolution
//!
//! Reconciles a birthday-list entry with the metadata catalog using two
//! strategies, first hit wins:
//!
//! 1. **Series roster**: look the guessed series up, score every roster member
//!    and take the best `Partial`/`Exact` match. A roster match cannot pick a
//!    same-named character from an unrelated series, so it is verified.
//! 2. **Global search**: score every search result, prefer results whose own
//!    series list confirms the guess, take the best `Partial`/`Exact` match or
//!    fall back to the top raw result as an unverified match.
//!
//! Whenever a series guess was supplied and the chosen record's series does
//! not confirm it, the biography is cleared so a wrong description is never
//! attached to a post.

use charday_common::{CanonicalCharacter, RawCharacter};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogMember, CatalogRecord, CatalogSeries, MetadataCatalog};
use crate::matching::{series_confirmed, MatchTier, NameQuery};
use crate::utils::{retry_with_backoff, RetryPolicy};

/// Which strategy produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    SeriesRoster,
    GlobalSearch,
    Unverified,
}

/// Resolves [`RawCharacter`]s against a [`MetadataCatalog`]
pub struct CharacterResolver {
    catalog: Arc<dyn MetadataCatalog>,
    retry: RetryPolicy,
    search_limit: u32,
}

impl CharacterResolver {
    pub fn new(catalog: Arc<dyn MetadataCatalog>, retry: RetryPolicy, search_limit: u32) -> Self {
        Self {
            catalog,
            retry,
            search_limit: search_limit.max(1),
        }
    }

    /// Best-effort resolution; catalog failures yield `None`
    ///
    /// Callers fall back to the raw entry's name and series guess.
    pub async fn resolve(&self, raw: &RawCharacter) -> Option<CanonicalCharacter> {
        match self.try_resolve(raw).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(
                    character = %raw.name,
                    catalog = self.catalog.name(),
                    error = %e,
                    "Catalog unavailable, continuing without identity resolution"
                );
                None
            }
        }
    }

    /// Resolution that surfaces catalog failures once retries are exhausted
    pub async fn try_resolve(
        &self,
        raw: &RawCharacter,
    ) -> Result<Option<CanonicalCharacter>, CatalogError> {
        let query = NameQuery::new(&raw.name);
        let guess = raw
            .series_name_guess
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty());

        if let Some(series_guess) = guess {
            if let Some(character) = self.resolve_in_series(raw, &query, series_guess).await? {
                return Ok(Some(character));
            }
        }

        self.resolve_by_search(raw, &query, guess).await
    }

    async fn resolve_in_series(
        &self,
        raw: &RawCharacter,
        query: &NameQuery,
        series_guess: &str,
    ) -> Result<Option<CanonicalCharacter>, CatalogError> {
        let series: Option<CatalogSeries> = retry_with_backoff("catalog series lookup", self.retry, || {
            self.catalog.find_series(series_guess)
        })
        .await?;

        let Some(series) = series else {
            debug!(character = %raw.name, series = %series_guess, "Series not in catalog");
            return Ok(None);
        };

        let roster = match retry_with_backoff("catalog roster", self.retry, || {
            self.catalog.list_roster(series.id)
        })
        .await
        {
            Ok(roster) => roster,
            Err(CatalogError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut best: Option<(&CatalogMember, MatchTier)> = None;
        for member in &roster {
            let tier = query.best_score(member.all_names());
            if tier.is_match() && best.map_or(true, |(_, t)| tier > t) {
                best = Some((member, tier));
            }
        }

        let Some((member, tier)) = best else {
            debug!(
                character = %raw.name,
                series = %series.title,
                roster_size = roster.len(),
                "No roster match"
            );
            return Ok(None);
        };

        let record = match self.full_record(member.id).await {
            Ok(record) => record,
            Err(CatalogError::NotFound(_)) => {
                debug!(
                    character = %raw.name,
                    catalog_id = member.id,
                    "Roster match has no full record, trying search"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!(
            character = %raw.name,
            catalog_id = record.id,
            series = %series.title,
            tier = ?tier,
            strategy = ?ResolveStrategy::SeriesRoster,
            "Character resolved"
        );

        Ok(Some(canonical_from(record, series.title, raw, true)))
    }

    async fn resolve_by_search(
        &self,
        raw: &RawCharacter,
        query: &NameQuery,
        guess: Option<&str>,
    ) -> Result<Option<CanonicalCharacter>, CatalogError> {
        let results = retry_with_backoff("catalog character search", self.retry, || {
            self.catalog.search_characters(&raw.name, self.search_limit)
        })
        .await?;

        let Some(top) = results.first() else {
            info!(character = %raw.name, "Catalog search returned no results");
            return Ok(None);
        };

        // Rank by (tier, series bonus); first result wins among equals
        let mut best: Option<(&CatalogMember, MatchTier, bool)> = None;
        for member in &results {
            let tier = query.best_score(member.all_names());
            if !tier.is_match() {
                continue;
            }
            let bonus = series_confirmed(guess, &member.series_titles);
            if best.map_or(true, |(_, t, b)| (tier, bonus) > (t, b)) {
                best = Some((member, tier, bonus));
            }
        }

        let (chosen, strategy) = match best {
            Some((member, _, _)) => (member, ResolveStrategy::GlobalSearch),
            None => (top, ResolveStrategy::Unverified),
        };

        let mut record = self.full_record(chosen.id).await?;
        if record.series_titles.is_empty() {
            record.series_titles = chosen.series_titles.clone();
        }

        let confirmed = series_confirmed(guess, &record.series_titles);
        let series_mismatch = guess.is_some() && !confirmed;

        if series_mismatch && record.about.take().is_some() {
            warn!(
                character = %raw.name,
                catalog_id = record.id,
                series_guess = guess.unwrap_or_default(),
                "Series not confirmed, discarding biography"
            );
        }

        let series_name = pick_series_name(&record.series_titles, guess, confirmed);
        let verified = strategy == ResolveStrategy::GlobalSearch && !series_mismatch;

        info!(
            character = %raw.name,
            catalog_id = record.id,
            series = %series_name,
            verified,
            strategy = ?strategy,
            "Character resolved"
        );

        Ok(Some(canonical_from(record, series_name, raw, verified)))
    }

    async fn full_record(&self, character_id: u64) -> Result<CatalogRecord, CatalogError> {
        retry_with_backoff("catalog full record", self.retry, || {
            self.catalog.get_full_record(character_id)
        })
        .await
    }
}

/// Title confirming the guess when there is one, else the most popular title
fn pick_series_name(titles: &[String], guess: Option<&str>, confirmed: bool) -> String {
    if confirmed {
        if let Some(title) = titles
            .iter()
            .find(|t| series_confirmed(guess, std::slice::from_ref(*t)))
        {
            return title.clone();
        }
    }

    titles
        .first()
        .cloned()
        .or_else(|| guess.map(str::to_string))
        .unwrap_or_default()
}

fn canonical_from(
    record: CatalogRecord,
    series_name: String,
    raw: &RawCharacter,
    verified: bool,
) -> CanonicalCharacter {
    CanonicalCharacter {
        id: record.id,
        name: record.name,
        name_native: record.name_native,
        series_name,
        series_titles: record.series_titles,
        favorites_count: record.favorites,
        about: record.about,
        genre_tags: record.genres,
        image: record.image,
        source_candidate_id: raw.id.clone(),
        verified,
    }
}
