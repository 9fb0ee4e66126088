//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{TagDefinition, TagKind};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetching behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// The news source
    #[serde(default)]
    pub source: SourceConfig,

    /// CSS selectors describing the source page layout
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Cycle timing and backoff
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Article persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Read API
    #[serde(default)]
    pub api: ApiConfig,

    /// Event fan-out
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Keyword tags matched against article titles
    #[serde(default = "defaults::tags")]
    pub tags: Vec<TagDefinition>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply `NEWSROOM_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup("NEWSROOM_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.scheduler.interval_secs = secs;
        }
        if let Some(n) = lookup("NEWSROOM_MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
            self.crawler.max_concurrent = n;
        }
        if let Some(secs) = lookup("NEWSROOM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.crawler.timeout_secs = secs;
        }
        if let Some(bind) = lookup("NEWSROOM_BIND") {
            self.api.bind = bind;
        }
        if let Some(dir) = lookup("NEWSROOM_STORAGE_DIR") {
            self.storage.dir = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.retry_base_ms > self.crawler.retry_max_ms {
            return Err(AppError::validation(
                "crawler.retry_base_ms must not exceed crawler.retry_max_ms",
            ));
        }
        url::Url::parse(&self.source.listing_url).map_err(|e| {
            AppError::validation(format!(
                "source.listing_url '{}' is not a valid URL: {e}",
                self.source.listing_url
            ))
        })?;
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::validation("scheduler.interval_secs must be > 0"));
        }
        if self.scheduler.backoff_base_secs == 0 {
            return Err(AppError::validation(
                "scheduler.backoff_base_secs must be > 0",
            ));
        }
        if self.scheduler.backoff_base_secs > self.scheduler.backoff_max_secs {
            return Err(AppError::validation(
                "scheduler.backoff_base_secs must not exceed scheduler.backoff_max_secs",
            ));
        }
        if self.api.default_page_size == 0 || self.api.max_page_size == 0 {
            return Err(AppError::validation("api page sizes must be > 0"));
        }
        if self.api.default_page_size > self.api.max_page_size {
            return Err(AppError::validation(
                "api.default_page_size must not exceed api.max_page_size",
            ));
        }
        if self.notifier.capacity == 0 {
            return Err(AppError::validation("notifier.capacity must be > 0"));
        }
        if let Some(tag) = self.tags.iter().find(|t| t.name.trim().is_empty()) {
            return Err(AppError::validation(format!(
                "tag of kind '{}' has an empty name",
                tag.kind.as_str()
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            source: SourceConfig::default(),
            selectors: SelectorConfig::default(),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            notifier: NotifierConfig::default(),
            tags: defaults::tags(),
        }
    }
}

/// HTTP client and fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-attempt request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry, doubled for each following one
    #[serde(default = "defaults::retry_base")]
    pub retry_base_ms: u64,

    /// Upper bound for the retry backoff
    #[serde(default = "defaults::retry_max")]
    pub retry_max_ms: u64,

    /// Delay between detail requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent detail fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_base_ms: defaults::retry_base(),
            retry_max_ms: defaults::retry_max(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Where the featured news come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Page carrying the featured news carousel
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    /// Skip detail fetches for articles that are already stored
    #[serde(default)]
    pub skip_known: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: defaults::listing_url(),
            skip_known: false,
        }
    }
}

/// CSS selectors and patterns for the listing and detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// One element per featured article on the listing page
    #[serde(default = "defaults::listing_item")]
    pub listing_item: String,

    /// Items whose `id` contains this marker are carousel clones
    #[serde(default = "defaults::clone_marker")]
    pub clone_marker: String,

    #[serde(default = "defaults::listing_link")]
    pub listing_link: String,

    #[serde(default = "defaults::listing_title")]
    pub listing_title: String,

    #[serde(default = "defaults::listing_thumbnail")]
    pub listing_thumbnail: String,

    #[serde(default = "defaults::detail_title")]
    pub detail_title: String,

    #[serde(default = "defaults::detail_thumbnail")]
    pub detail_thumbnail: String,

    #[serde(default = "defaults::detail_author")]
    pub detail_author: String,

    /// Capture group 1 is the author name
    #[serde(default = "defaults::author_pattern")]
    pub author_pattern: String,

    #[serde(default = "defaults::detail_published")]
    pub detail_published: String,

    /// Container of the article body; its absence means the page is not an article
    #[serde(default = "defaults::detail_body_container")]
    pub detail_body_container: String,

    #[serde(default = "defaults::detail_body")]
    pub detail_body: String,

    #[serde(default = "defaults::detail_tags")]
    pub detail_tags: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_item: defaults::listing_item(),
            clone_marker: defaults::clone_marker(),
            listing_link: defaults::listing_link(),
            listing_title: defaults::listing_title(),
            listing_thumbnail: defaults::listing_thumbnail(),
            detail_title: defaults::detail_title(),
            detail_thumbnail: defaults::detail_thumbnail(),
            detail_author: defaults::detail_author(),
            author_pattern: defaults::author_pattern(),
            detail_published: defaults::detail_published(),
            detail_body_container: defaults::detail_body_container(),
            detail_body: defaults::detail_body(),
            detail_tags: defaults::detail_tags(),
        }
    }
}

/// Scrape cycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduled cycles
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// First backoff after a failed listing fetch
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_secs: u64,

    /// Ceiling for the listing backoff
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_secs: u64,

    /// Number of cycle results kept in memory
    #[serde(default = "defaults::history_size")]
    pub history_size: usize,

    /// Run a cycle immediately on startup instead of waiting one interval
    #[serde(default = "defaults::run_on_start")]
    pub run_on_start: bool,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            backoff_base_secs: defaults::backoff_base(),
            backoff_max_secs: defaults::backoff_max(),
            history_size: defaults::history_size(),
            run_on_start: defaults::run_on_start(),
        }
    }
}

/// Article persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for `articles.json`; in-memory only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Read API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "defaults::bind")]
    pub bind: String,

    #[serde(default = "defaults::default_page_size")]
    pub default_page_size: usize,

    #[serde(default = "defaults::max_page_size")]
    pub max_page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            default_page_size: defaults::default_page_size(),
            max_page_size: defaults::max_page_size(),
        }
    }
}

/// Event fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Events buffered per subscriber before the slowest ones start lagging
    #[serde(default = "defaults::notifier_capacity")]
    pub capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::notifier_capacity(),
        }
    }
}

mod defaults {
    use super::{TagDefinition, TagKind};

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; newsroom/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_base() -> u64 {
        500
    }
    pub fn retry_max() -> u64 {
        8_000
    }
    pub fn request_delay() -> u64 {
        0
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Source defaults
    pub fn listing_url() -> String {
        "https://tw-nba.udn.com/nba/index".into()
    }

    // Selector defaults
    pub fn listing_item() -> String {
        "li.splide__slide".into()
    }
    pub fn clone_marker() -> String {
        "clone".into()
    }
    pub fn listing_link() -> String {
        "a[href]".into()
    }
    pub fn listing_title() -> String {
        "h3, .title, .splide__slide__title".into()
    }
    pub fn listing_thumbnail() -> String {
        "img".into()
    }
    pub fn detail_title() -> String {
        ".story_art_title".into()
    }
    pub fn detail_thumbnail() -> String {
        ".photo-story img".into()
    }
    pub fn detail_author() -> String {
        ".shareBar__info--author".into()
    }
    pub fn author_pattern() -> String {
        "記者(.*?)／".into()
    }
    pub fn detail_published() -> String {
        ".shareBar__info--author span".into()
    }
    pub fn detail_body_container() -> String {
        "#story_body_content".into()
    }
    pub fn detail_body() -> String {
        "#story_body_content > span > p".into()
    }
    pub fn detail_tags() -> String {
        ".story_tags a, .tags a".into()
    }

    // Scheduler defaults
    pub fn interval() -> u64 {
        30 * 60
    }
    pub fn backoff_base() -> u64 {
        30
    }
    pub fn backoff_max() -> u64 {
        15 * 60
    }
    pub fn history_size() -> usize {
        50
    }
    pub fn run_on_start() -> bool {
        true
    }

    // API defaults
    pub fn bind() -> String {
        "127.0.0.1:8080".into()
    }
    pub fn default_page_size() -> usize {
        20
    }
    pub fn max_page_size() -> usize {
        100
    }

    // Notifier defaults
    pub fn notifier_capacity() -> usize {
        256
    }

    // Tag defaults
    pub fn tags() -> Vec<TagDefinition> {
        let teams = [
            "湖人", "勇士", "塞爾提克", "公鹿", "金塊", "太陽", "獨行俠", "尼克", "76人", "熱火",
        ];
        let players = ["詹姆斯", "柯瑞", "約基奇", "唐西奇", "字母哥", "杜蘭特"];

        teams
            .iter()
            .map(|name| TagDefinition {
                name: name.to_string(),
                kind: TagKind::Team,
            })
            .chain(players.iter().map(|name| TagDefinition {
                name: name.to_string(),
                kind: TagKind::Player,
            }))
            .collect()
    }
}
