//! Application configuration for SiteDesk.
//!
//! User config lives at `~/.sitedesk/sitedesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SiteDeskError};
use crate::types::{BusinessCalendar, BusinessProfile};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitedesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitedesk";

/// Default snapshot database file name inside the config directory.
const INDEX_DB_FILE_NAME: &str = "index.db";

// ---------------------------------------------------------------------------
// Config structs (matching sitedesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub business: BusinessConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub crawl: CrawlSettings,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub grounding: GroundingConfig,
}

/// `[business]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    /// Identifier used to key the index snapshot.
    #[serde(default = "default_business_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Fixed company description handed to the conversation layer.
    #[serde(default)]
    pub description: String,

    /// Company website root. Required for retrieval.
    #[serde(default)]
    pub site_url: String,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            id: default_business_id(),
            name: String::new(),
            description: String::new(),
            site_url: String::new(),
        }
    }
}

fn default_business_id() -> String {
    "default".into()
}

/// `[calendar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// IANA timezone of the business.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_hours_start")]
    pub hours_start: u32,

    #[serde(default = "default_hours_end")]
    pub hours_end: u32,

    /// URL of a JSON busy-interval feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_feed_url: Option<String>,

    /// Local JSON file with busy intervals (used when no feed URL is set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_file: Option<String>,

    /// Horizon used when the caller does not ask for a specific one.
    #[serde(default = "default_days_ahead")]
    pub default_days_ahead: u32,

    /// Upper bound on any requested horizon.
    #[serde(default = "default_max_days_ahead")]
    pub max_days_ahead: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            hours_start: default_hours_start(),
            hours_end: default_hours_end(),
            busy_feed_url: None,
            busy_file: None,
            default_days_ahead: default_days_ahead(),
            max_days_ahead: default_max_days_ahead(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_hours_start() -> u32 {
    9
}
fn default_hours_end() -> u32 {
    17
}
fn default_days_ahead() -> u32 {
    5
}
fn default_max_days_ahead() -> u32 {
    30
}
fn default_timeout_secs() -> u64 {
    20
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum number of pages collected per crawl.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum characters of normalized text kept per page.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Pause in ms between sequential fetches.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Permit crawling loopback/private hosts (intranet sites, tests).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_text_chars: default_max_text_chars(),
            rate_limit_ms: default_rate_limit(),
            timeout_secs: default_timeout_secs(),
            allow_private_hosts: false,
        }
    }
}

fn default_max_pages() -> usize {
    30
}
fn default_max_text_chars() -> usize {
    4000
}
fn default_rate_limit() -> u64 {
    200
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_embeddings_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embeddings_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_embeddings_base_url(),
            model: default_embedding_model(),
            timeout_secs: default_embeddings_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_embeddings_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embeddings_timeout() -> u64 {
    30
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Snapshot database path. Empty means `~/.sitedesk/index.db`.
    #[serde(default)]
    pub db_path: String,

    /// Snapshot lifetime in hours. `0` keeps a snapshot forever.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Pages returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            max_age_hours: default_max_age_hours(),
            top_k: default_top_k(),
        }
    }
}

fn default_max_age_hours() -> u64 {
    168
}
fn default_top_k() -> usize {
    3
}

/// `[grounding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Case-insensitive phrases that route a query to the availability engine.
    #[serde(default = "default_booking_keywords")]
    pub booking_keywords: Vec<String>,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            booking_keywords: default_booking_keywords(),
        }
    }
}

fn default_booking_keywords() -> Vec<String> {
    [
        "appointment",
        "book",
        "booking",
        "schedule",
        "meeting",
        "available",
        "availability",
        "free slot",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum number of pages collected.
    pub max_pages: usize,
    /// Maximum characters of text kept per page.
    pub max_text_chars: usize,
    /// Pause in ms between sequential fetches.
    pub rate_limit_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Whether loopback/private hosts may be fetched.
    pub allow_private_hosts: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_pages: config.crawl.max_pages,
            max_text_chars: config.crawl.max_text_chars,
            rate_limit_ms: config.crawl.rate_limit_ms,
            timeout_secs: config.crawl.timeout_secs,
            allow_private_hosts: config.crawl.allow_private_hosts,
        }
    }
}

impl AppConfig {
    /// Resolve the `[business]` and `[calendar]` sections into a validated profile.
    pub fn business_profile(&self) -> Result<BusinessProfile> {
        let site = self.business.site_url.trim();
        if site.is_empty() {
            return Err(SiteDeskError::config(
                "business.site_url is not set. Add it to sitedesk.toml",
            ));
        }
        let site_url = Url::parse(site)
            .map_err(|e| SiteDeskError::config(format!("invalid business.site_url '{site}': {e}")))?;

        let calendar = BusinessCalendar::new(
            &self.calendar.timezone,
            self.calendar.hours_start,
            self.calendar.hours_end,
        )?;

        let name = if self.business.name.is_empty() {
            site_url.host_str().unwrap_or("business").to_string()
        } else {
            self.business.name.clone()
        };

        Ok(BusinessProfile {
            id: self.business.id.clone(),
            name,
            description: self.business.description.clone(),
            site_url,
            calendar,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitedesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteDeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitedesk/sitedesk.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the snapshot database path from `[index].db_path`.
pub fn index_db_path(config: &AppConfig) -> Result<PathBuf> {
    if config.index.db_path.trim().is_empty() {
        return Ok(config_dir()?.join(INDEX_DB_FILE_NAME));
    }
    Ok(PathBuf::from(config.index.db_path.trim()))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteDeskError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteDeskError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteDeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteDeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteDeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the embedding API key from the env var named in config.
///
/// Returns `None` when the variable is unset or empty; retrieval then
/// reports itself as unavailable rather than failing.
pub fn embedding_api_key(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.embeddings.api_key_env) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
