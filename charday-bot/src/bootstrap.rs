//! Component construction from configuration
//!
//! Builds every production collaborator once per process. The image provider
//! list is assembled here in its fixed priority order; optional providers are
//! left out entirely rather than reordered.

use charday_common::config::{AppConfig, RootFolder, StateBackend};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::catalog::{AniListClient, CatalogError, MetadataCatalog};
use crate::config::Secrets;
use crate::images::providers::{
    BooruProvider, CatalogImageProvider, CuratedArtProvider, PlaceholderFilter,
    SourceFullImageProvider, SourceThumbnailProvider, WebSearchProvider,
};
use crate::images::{
    FetchError, GoogleVisionClient, HttpFetcher, ImagePipeline, ImageProvider, ImageValidator,
    ProviderError, RecognitionError,
};
use crate::lifecycle::{DailyPostLifecycle, JsonStateStore, SqliteStateStore, StateStore};
use crate::publish::{HttpPostingService, PublishError, TemplateCaption};
use crate::resolver::CharacterResolver;
use crate::source::JsonFileBirthdaySource;
use crate::utils::RetryPolicy;
use crate::workflow::{DailyWorkflow, Housekeeper};

/// Candidates requested from each image provider
pub const CANDIDATES_PER_PROVIDER: usize = 10;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Common(#[from] charday_common::Error),

    #[error("Catalog client: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Image provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Image fetcher: {0}")]
    Fetch(#[from] FetchError),

    #[error("Content recognition: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Posting service: {0}")]
    Publish(#[from] PublishError),
}

/// Everything the CLI commands need
pub struct Components {
    pub workflow: Arc<DailyWorkflow>,
    pub store: Arc<dyn StateStore>,
    pub housekeeper: Housekeeper,
}

/// Open the configured state store under the root folder
pub async fn open_state_store(
    config: &AppConfig,
    root: &RootFolder,
) -> Result<Arc<dyn StateStore>, BootstrapError> {
    let store: Arc<dyn StateStore> = match config.state.backend {
        StateBackend::Sqlite => {
            let path = root.database_path();
            info!(path = %path.display(), "Using SQLite state store");
            Arc::new(SqliteStateStore::open(&path).await?)
        }
        StateBackend::Json => {
            let dir = root.state_dir();
            info!(path = %dir.display(), "Using JSON state store");
            Arc::new(JsonStateStore::new(dir))
        }
    };
    Ok(store)
}

/// Image providers in priority order
pub fn build_image_providers(
    config: &AppConfig,
    secrets: &Secrets,
) -> Result<Vec<Arc<dyn ImageProvider>>, BootstrapError> {
    let images = &config.images;
    let timeout = Duration::from_secs(images.download_timeout_secs);
    let interval = Duration::from_millis(images.request_interval_ms);
    let placeholders = PlaceholderFilter::new(&images.placeholder_patterns);

    let mut providers: Vec<Arc<dyn ImageProvider>> = Vec::new();

    if let Some(path) = &images.curated_index {
        providers.push(Arc::new(CuratedArtProvider::from_path(path)?));
    }
    if images.booru.enabled {
        providers.push(Arc::new(BooruProvider::new(&images.booru, timeout, interval)?));
    }
    if let Some(search) = WebSearchProvider::from_config(
        &images.web_search,
        secrets.web_search_api_key.clone(),
        timeout,
        interval,
    )? {
        providers.push(Arc::new(search));
    }
    providers.push(Arc::new(SourceFullImageProvider::new(placeholders.clone())));
    providers.push(Arc::new(CatalogImageProvider));
    providers.push(Arc::new(SourceThumbnailProvider::new(placeholders)));

    Ok(providers)
}

/// Validator with the recognizer attached when enabled and keyed
pub fn build_validator(config: &AppConfig, secrets: &Secrets) -> Result<ImageValidator, BootstrapError> {
    let validator = ImageValidator::from_config(&config.images);
    let vision = &config.images.vision;

    match (&secrets.vision_api_key, vision.enabled) {
        (Some(key), true) => {
            let client = GoogleVisionClient::new(vision, key.clone())?;
            Ok(validator.with_recognizer(Arc::new(client)))
        }
        (None, true) => {
            info!("Content recognition enabled but not keyed, skipping soft gate");
            Ok(validator)
        }
        _ => Ok(validator),
    }
}

/// Build the workflow and its store from configuration
pub async fn build_components(
    config: &AppConfig,
    root: &RootFolder,
) -> Result<Components, BootstrapError> {
    root.ensure_directories()?;
    let secrets = Secrets::resolve(config);

    let store = open_state_store(config, root).await?;

    let catalog: Arc<dyn MetadataCatalog> = Arc::new(AniListClient::new(&config.catalog)?);
    let resolver = Arc::new(CharacterResolver::new(
        catalog,
        RetryPolicy::from(config.catalog.retry.clone()),
        config.catalog.search_limit,
    ));

    let providers = build_image_providers(config, &secrets)?;
    let fetcher = Arc::new(HttpFetcher::new(
        root.work_dir(),
        Duration::from_secs(config.images.download_timeout_secs),
        config.images.max_download_bytes,
        Duration::from_millis(config.images.request_interval_ms),
    )?);
    let pipeline = ImagePipeline::new(
        providers,
        fetcher,
        build_validator(config, &secrets)?,
        CANDIDATES_PER_PROVIDER,
    );
    info!(providers = ?pipeline.provider_names(), "Image providers configured");

    let lifecycle = Arc::new(DailyPostLifecycle::new(
        store.clone(),
        config.slot_times()?,
        config.reference_offset()?,
    ));

    let poster = Arc::new(HttpPostingService::new(
        &config.publisher,
        secrets.publisher_token.clone(),
    )?);
    if poster.is_dry_run() {
        info!("Publisher in dry-run mode, nothing will be posted");
    }

    let source = Arc::new(JsonFileBirthdaySource::new(
        root.candidates_dir(&config.source),
    ));
    let captions = Arc::new(TemplateCaption::new(config.publisher.hashtags.clone()));

    let workflow = Arc::new(DailyWorkflow::new(
        source,
        resolver,
        Arc::new(pipeline),
        lifecycle,
        poster,
        captions,
    ));

    Ok(Components {
        workflow,
        store: store.clone(),
        housekeeper: Housekeeper::new(store, config.state.retention_days),
    })
}
