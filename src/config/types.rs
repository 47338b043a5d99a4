use crate::sites::{SavedSearch, SearchQuery, Site};
use crate::{ConfigError, ConfigResult};
use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
    #[serde(default)]
    pub ebay: EbayConfig,
    #[serde(default, rename = "cars-and-bids")]
    pub cars_and_bids: CarsAndBidsConfig,
    #[serde(default, rename = "bring-a-trailer")]
    pub bring_a_trailer: BringATrailerConfig,
}

impl Config {
    /// Resolves which site this run ingests
    ///
    /// `selector` (from the command line or `SCRAPER_SERVICE`) wins over
    /// `[pipeline] site`.
    pub fn selected_site(&self, selector: Option<&str>) -> ConfigResult<Site> {
        match selector.or(self.pipeline.site.as_deref()) {
            Some(name) => name.parse(),
            None => Err(ConfigError::Validation(
                "no site selected: pass --site, set SCRAPER_SERVICE, or set [pipeline] site"
                    .to_string(),
            )),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
}

/// Plain HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    format!("auction-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    60
}

/// Rendering service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of the Browserless-compatible service
    #[serde(default = "default_browser_endpoint")]
    pub endpoint: String,

    /// Name of the environment variable holding the service token
    #[serde(rename = "token-env", default)]
    pub token_env: Option<String>,
}

impl BrowserConfig {
    /// Reads the service token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        self.token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty())
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: default_browser_endpoint(),
            token_env: None,
        }
    }
}

fn default_browser_endpoint() -> String {
    "http://localhost:3000".to_string()
}

/// Pipeline behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Default site selector
    #[serde(default)]
    pub site: Option<String>,

    /// Safety cap on search pages requested per criterion
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Pause between page loads (milliseconds)
    #[serde(rename = "page-delay-ms", default)]
    pub page_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            site: None,
            max_pages: default_max_pages(),
            page_delay_ms: 0,
        }
    }
}

fn default_max_pages() -> u32 {
    100
}

/// Screenshot storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_directory")]
    pub directory: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            directory: default_artifacts_directory(),
        }
    }
}

fn default_artifacts_directory() -> String {
    "./screenshots".to_string()
}

/// Cache invalidation endpoint called after every run
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(rename = "cache-url")]
    pub cache_url: String,

    /// Name of the environment variable holding the pre-shared key
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,
}

impl NotifyConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

/// eBay Motors saved searches
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbayConfig {
    #[serde(default)]
    pub searches: Vec<SavedSearch>,
}

/// Cars & Bids search strings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarsAndBidsConfig {
    #[serde(default)]
    pub searches: Vec<SearchQuery>,
}

/// Bring a Trailer keyword pages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BringATrailerConfig {
    #[serde(rename = "keyword-pages", default)]
    pub keyword_pages: Vec<i64>,
}
