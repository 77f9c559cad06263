//! Configuration loading and root folder resolution
//!
//! Config file priority:
//! 1. Command-line `--config` (must exist when given)
//! 2. `CHARDAY_CONFIG` environment variable
//! 3. `<config_dir>/charday/charday.toml`
//! 4. Built-in defaults (missing file is a warning, not an error)
//!
//! Root folder priority: command-line → `CHARDAY_ROOT_FOLDER` → TOML
//! `root_folder` → OS-dependent default.

use crate::{Error, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CHARDAY_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "CHARDAY_ROOT_FOLDER";

/// Where [`AppConfig::load`] took its settings from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file was found
    Defaults,
}

impl ConfigSource {
    /// Log the outcome of the config file search
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
            ConfigSource::Defaults => warn!("No config file found, using built-in defaults"),
        }
    }
}

/// Complete bot configuration as read from `charday.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Data folder (state database, work files, candidate files)
    pub root_folder: Option<PathBuf>,
    /// Reference time zone as minutes east of UTC (540 = JST)
    pub utc_offset_minutes: i32,
    pub schedule: ScheduleConfig,
    pub catalog: CatalogConfig,
    pub images: ImagesConfig,
    pub publisher: PublisherConfig,
    pub source: SourceConfig,
    pub state: StateConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            utc_offset_minutes: 540,
            schedule: ScheduleConfig::default(),
            catalog: CatalogConfig::default(),
            images: ImagesConfig::default(),
            publisher: PublisherConfig::default(),
            source: SourceConfig::default(),
            state: StateConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Daily slot table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Slot times (`HH:MM`, reference zone), strictly increasing
    pub slots: Vec<String>,
    /// How late a missed slot may still be published after a restart
    pub catch_up_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slots: ["08:00", "10:00", "12:00", "14:00", "16:00", "18:00", "20:00"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            catch_up_minutes: 30,
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Metadata catalog client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub endpoint: String,
    /// Maximum results requested from a global search
    pub search_limit: u32,
    /// Minimum spacing between two catalog requests
    pub request_interval_ms: u64,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://graphql.anilist.co".to_string(),
            search_limit: 10,
            request_interval_ms: 700,
            timeout_secs: 15,
            retry: RetryConfig::default(),
        }
    }
}

/// Image resolution and validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Smallest accepted file size in bytes
    pub min_bytes: u64,
    /// Smallest accepted width and height in pixels
    pub min_dimension: u32,
    /// Downloads larger than this are abandoned
    pub max_download_bytes: u64,
    pub download_timeout_secs: u64,
    /// Minimum spacing between two requests to the same host
    pub request_interval_ms: u64,
    /// URL substrings marking a source image as a placeholder
    pub placeholder_patterns: Vec<String>,
    /// JSON manifest of curated official art
    pub curated_index: Option<PathBuf>,
    pub booru: BooruConfig,
    pub web_search: WebSearchConfig,
    pub vision: VisionConfig,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            min_bytes: 20_000,
            min_dimension: 300,
            max_download_bytes: 20 * 1024 * 1024,
            download_timeout_secs: 20,
            request_interval_ms: 1000,
            placeholder_patterns: vec![
                "questionmark".to_string(),
                "no_image".to_string(),
                "nopicture".to_string(),
                "/default.".to_string(),
            ],
            curated_index: None,
            booru: BooruConfig::default(),
            web_search: WebSearchConfig::default(),
            vision: VisionConfig::default(),
        }
    }
}

/// Tag-based community image provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BooruConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub limit: u32,
}

impl Default for BooruConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://safebooru.donmai.us".to_string(),
            limit: 20,
        }
    }
}

/// General image search provider (disabled unless keyed)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub engine_id: Option<String>,
    pub limit: u32,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            api_key: None,
            engine_id: None,
            limit: 10,
        }
    }
}

/// Optional content recognition service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            api_key: None,
            timeout_secs: 20,
        }
    }
}

/// Social posting service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// When true, nothing is sent and synthetic receipts are returned
    pub dry_run: bool,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Hashtags appended to every caption
    pub hashtags: Vec<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            endpoint: None,
            token: None,
            timeout_secs: 30,
            hashtags: vec!["#anime".to_string(), "#HappyBirthday".to_string()],
        }
    }
}

/// Birthday candidate source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Folder of `YYYY-MM-DD.json` candidate files (default `<root>/candidates`)
    pub candidates_dir: Option<PathBuf>,
}

/// Persisted state backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    Sqlite,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackend,
    /// Days of state kept by housekeeping
    pub retention_days: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Sqlite,
            retention_days: 7,
        }
    }
}

/// Read-only status API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5790,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration following the priority order in the module docs
    ///
    /// Nothing is logged here: this runs before the subscriber exists, so the
    /// caller reports the returned [`ConfigSource`] once logging is up.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = cli_path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = Self::load_from_path(path)?;
            return Ok((config, ConfigSource::File(path.to_path_buf())));
        }

        match resolve_config_path(None) {
            Some(path) => {
                let config = Self::load_from_path(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            None => {
                let config = AppConfig::default();
                config.validate()?;
                Ok((config, ConfigSource::Defaults))
            }
        }
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let times = self.slot_times()?;
        if times.is_empty() {
            return Err(Error::Config("schedule.slots must not be empty".to_string()));
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(
                "schedule.slots must be strictly increasing".to_string(),
            ));
        }
        if self.images.min_bytes == 0 || self.images.min_dimension == 0 {
            return Err(Error::Config(
                "images.min_bytes and images.min_dimension must be positive".to_string(),
            ));
        }
        if self.catalog.retry.max_attempts == 0 {
            return Err(Error::Config(
                "catalog.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.state.retention_days == 0 {
            return Err(Error::Config("state.retention_days must be positive".to_string()));
        }
        self.reference_offset()?;
        Ok(())
    }

    /// Parsed slot table, in slot-index order
    pub fn slot_times(&self) -> Result<Vec<NaiveTime>> {
        self.schedule
            .slots
            .iter()
            .map(|s| crate::time::parse_slot_time(s))
            .collect()
    }

    pub fn reference_offset(&self) -> Result<FixedOffset> {
        crate::time::reference_offset(self.utc_offset_minutes)
    }
}

/// Locate the config file without a command-line override
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("charday").join("charday.toml"))
        .filter(|p| p.exists())
}

/// Resolve the data root folder
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &AppConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent default
    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("charday"))
        .unwrap_or_else(|| PathBuf::from("./charday_data"))
}

/// Layout of files under the root folder
#[derive(Debug, Clone)]
pub struct RootFolder {
    root: PathBuf,
}

impl RootFolder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// SQLite state database
    pub fn database_path(&self) -> PathBuf {
        self.root.join("charday.db")
    }

    /// JSON state files (one per date)
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Temporary image downloads
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Candidate files, honouring a configured override
    pub fn candidates_dir(&self, config: &SourceConfig) -> PathBuf {
        config
            .candidates_dir
            .clone()
            .unwrap_or_else(|| self.root.join("candidates"))
    }

    /// Create the root, state and work folders if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.state_dir(), self.work_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
