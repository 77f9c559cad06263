//! In-memory fakes of every external collaborator
//!
//! Nothing here touches the network. Downloaded images are synthesised as
//! noisy PNGs of the requested dimensions in a temporary directory.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use charday_bot::catalog::{
    CatalogError, CatalogMember, CatalogRecord, CatalogSeries, MetadataCatalog,
};
use charday_bot::images::providers::{
    CatalogImageProvider, PlaceholderFilter, SourceFullImageProvider, SourceThumbnailProvider,
};
use charday_bot::images::{
    FetchError, ImageCandidate, ImageFetcher, ImagePipeline, ImageProvider, ImageSubject,
    ImageValidator, ProviderError,
};
use charday_bot::lifecycle::{DailyPostLifecycle, JsonStateStore, StateStore};
use charday_bot::publish::{PostingService, PublishError, PublishReceipt, TemplateCaption};
use charday_bot::source::{BirthdaySource, SourceError};
use charday_bot::utils::RetryPolicy;
use charday_bot::{CharacterResolver, DailyWorkflow};
use charday_common::{DailyState, RawCharacter};
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

pub fn slot_times(times: &[&str]) -> Vec<NaiveTime> {
    times
        .iter()
        .map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap())
        .collect()
}

pub fn raw(id: &str, name: &str, guess: Option<&str>, favorites: u32) -> RawCharacter {
    RawCharacter {
        id: id.to_string(),
        name: name.to_string(),
        series_name_guess: guess.map(str::to_string),
        favorites_count: favorites,
        birthday_label: "Feb 3".to_string(),
        thumbnail_url: None,
        full_image_url: None,
    }
}

pub fn with_image(mut character: RawCharacter, url: &str) -> RawCharacter {
    character.full_image_url = Some(url.to_string());
    character
}

/// Noisy RGB PNG; noise keeps the encoded size well above the size gate
pub fn write_noise_png(path: &Path, width: u32, height: u32) {
    let mut state: u32 = 0x9e37_79b9;
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    img.save(path).unwrap();
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    pub series: HashMap<String, CatalogSeries>,
    pub rosters: HashMap<u64, Vec<CatalogMember>>,
    pub search: HashMap<String, Vec<CatalogMember>>,
    pub records: HashMap<u64, CatalogRecord>,
}

#[async_trait]
impl MetadataCatalog for FakeCatalog {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn find_series(&self, title: &str) -> Result<Option<CatalogSeries>, CatalogError> {
        Ok(self.series.get(title).cloned())
    }

    async fn list_roster(&self, series_id: u64) -> Result<Vec<CatalogMember>, CatalogError> {
        Ok(self.rosters.get(&series_id).cloned().unwrap_or_default())
    }

    async fn search_characters(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CatalogMember>, CatalogError> {
        Ok(self
            .search
            .get(query)
            .map(|r| r.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_full_record(&self, character_id: u64) -> Result<CatalogRecord, CatalogError> {
        self.records
            .get(&character_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(character_id.to_string()))
    }
}

pub fn member(id: u64, name: &str, series: &[&str]) -> CatalogMember {
    CatalogMember {
        id,
        name: name.to_string(),
        series_titles: series.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn record(id: u64, name: &str, series: &[&str], about: &str) -> CatalogRecord {
    CatalogRecord {
        id,
        name: name.to_string(),
        series_titles: series.iter().map(|s| s.to_string()).collect(),
        about: Some(about.to_string()),
        favorites: 5000,
        ..Default::default()
    }
}

// ============================================================================
// Images
// ============================================================================

/// Shared log of provider names in call order
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Rank the production provider of the same name carries
fn rank_of(name: &str) -> u8 {
    match name {
        "curated" => 1,
        "booru" => 2,
        "web-search" => 3,
        "source-full" => 4,
        "catalog" => 5,
        "source-thumbnail" => 6,
        _ => u8::MAX,
    }
}

/// Provider returning a fixed URL list (or an error)
pub struct StaticProvider {
    pub name: &'static str,
    pub rank: u8,
    pub urls: Vec<String>,
    pub sorts: bool,
    pub fail: bool,
    pub log: CallLog,
}

impl StaticProvider {
    pub fn new(name: &'static str, urls: &[&str], log: &CallLog) -> Self {
        Self {
            name,
            rank: rank_of(name),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            sorts: false,
            fail: false,
            log: log.clone(),
        }
    }

    pub fn sorted(mut self) -> Self {
        self.sorts = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl ImageProvider for StaticProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn rank(&self) -> u8 {
        self.rank
    }

    fn sorts_by_url(&self) -> bool {
        self.sorts
    }

    async fn candidates(
        &self,
        _subject: &ImageSubject<'_>,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, ProviderError> {
        self.log.lock().unwrap().push(self.name);
        if self.fail {
            return Err(ProviderError::Network("connection reset".to_string()));
        }
        Ok(self
            .urls
            .iter()
            .take(limit)
            .map(|u| ImageCandidate::new(u.clone()))
            .collect())
    }
}

/// Fetcher serving synthetic images of known dimensions
pub struct FakeFetcher {
    dir: PathBuf,
    images: HashMap<String, (u32, u32)>,
    counter: AtomicU32,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            images: HashMap::new(),
            counter: AtomicU32::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn serve(mut self, url: &str, width: u32, height: u32) -> Self {
        self.images.insert(url.to_string(), (width, height));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let Some((width, height)) = self.images.get(url).copied() else {
            return Err(FetchError::Status(404));
        };
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("download-{}.png", n));
        write_noise_png(&path, width, height);
        Ok(path)
    }
}

/// Files currently in a directory
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

// ============================================================================
// Source, posting service
// ============================================================================

pub struct MemorySource {
    pub candidates: Mutex<Vec<RawCharacter>>,
}

impl MemorySource {
    pub fn new(candidates: Vec<RawCharacter>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
        }
    }

    pub fn replace(&self, candidates: Vec<RawCharacter>) {
        *self.candidates.lock().unwrap() = candidates;
    }
}

#[async_trait]
impl BirthdaySource for MemorySource {
    async fn list_candidates(&self, _date: NaiveDate) -> Result<Vec<RawCharacter>, SourceError> {
        Ok(self.candidates.lock().unwrap().clone())
    }
}

/// Records every published caption; optionally rejects every post
#[derive(Default)]
pub struct FakePoster {
    pub fail: bool,
    pub published: Mutex<Vec<String>>,
}

impl FakePoster {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostingService for FakePoster {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn publish(&self, text: &str, image: &[u8]) -> Result<PublishReceipt, PublishError> {
        assert!(!image.is_empty());
        if self.fail {
            return Err(PublishError::Rejected {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        let mut published = self.published.lock().unwrap();
        published.push(text.to_string());
        let id = format!("post-{}", published.len());
        Ok(PublishReceipt {
            external_url: format!("https://social.example/{}", id),
            external_id: id,
        })
    }
}

// ============================================================================
// State store
// ============================================================================

/// JSON store whose reads and writes can be switched to fail with an I/O error
pub struct FailingStore {
    inner: JsonStateStore,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
}

impl FailingStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            inner: JsonStateStore::new(dir),
            fail_load: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
        }
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    fn io_error(op: &str) -> charday_common::Error {
        charday_common::Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("{} refused", op),
        ))
    }
}

#[async_trait]
impl StateStore for FailingStore {
    async fn load(&self, date: NaiveDate) -> charday_common::Result<Option<DailyState>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Self::io_error("load"));
        }
        self.inner.load(date).await
    }

    async fn save(&self, state: &DailyState) -> charday_common::Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(Self::io_error("save"));
        }
        self.inner.save(state).await
    }

    async fn prune_before(&self, cutoff: NaiveDate) -> charday_common::Result<usize> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(Self::io_error("prune"));
        }
        self.inner.prune_before(cutoff).await
    }

    async fn list_dates(&self) -> charday_common::Result<Vec<NaiveDate>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Self::io_error("list"));
        }
        self.inner.list_dates().await
    }
}

// ============================================================================
// Workflow assembly
// ============================================================================

pub struct Harness {
    pub workflow: DailyWorkflow,
    pub source: Arc<MemorySource>,
    pub poster: Arc<FakePoster>,
    pub store: Arc<FailingStore>,
    pub work_dir: PathBuf,
    _temp: tempfile::TempDir,
}

/// Workflow over the field-based providers, a fake fetcher and a JSON store
///
/// The store starts healthy; tests switch it to failing through `Harness::store`.
pub fn harness(
    candidates: Vec<RawCharacter>,
    catalog: FakeCatalog,
    serve: &[(&str, u32, u32)],
    poster: FakePoster,
    slots: &[&str],
) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let work_dir = temp.path().join("work");
    std::fs::create_dir_all(&work_dir).unwrap();

    let mut fetcher = FakeFetcher::new(&work_dir);
    for (url, w, h) in serve {
        fetcher = fetcher.serve(url, *w, *h);
    }

    let placeholders = PlaceholderFilter::new(&["questionmark".to_string()]);
    let providers: Vec<Arc<dyn ImageProvider>> = vec![
        Arc::new(SourceFullImageProvider::new(placeholders.clone())),
        Arc::new(CatalogImageProvider),
        Arc::new(SourceThumbnailProvider::new(placeholders)),
    ];
    let pipeline = ImagePipeline::new(
        providers,
        Arc::new(fetcher),
        ImageValidator::new(20_000, 300),
        5,
    );

    let resolver = CharacterResolver::new(
        Arc::new(catalog),
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        10,
    );

    let store = Arc::new(FailingStore::new(temp.path().join("state")));
    let lifecycle = DailyPostLifecycle::new(store.clone(), slot_times(slots), jst());

    let source = Arc::new(MemorySource::new(candidates));
    let poster = Arc::new(poster);

    let workflow = DailyWorkflow::new(
        source.clone(),
        Arc::new(resolver),
        Arc::new(pipeline),
        Arc::new(lifecycle),
        poster.clone(),
        Arc::new(TemplateCaption::new(vec!["#anime".to_string()])),
    );

    Harness {
        workflow,
        source,
        poster,
        store,
        work_dir,
        _temp: temp,
    }
}
