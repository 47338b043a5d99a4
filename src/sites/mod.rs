//! Site strategies
//!
//! Every marketplace is one hand-written implementation of [`SiteStrategy`]. A strategy
//! knows how to page through its search results and how to turn one listing page into an
//! [`AuctionRecord`](crate::extract::AuctionRecord); everything else (dedup, persistence,
//! the retry ledger) is shared by the [`Orchestrator`](crate::pipeline::Orchestrator).

mod bring_a_trailer;
mod cars_and_bids;
mod ebay;

pub use bring_a_trailer::BringATrailer;
pub use cars_and_bids::CarsAndBids;
pub use ebay::EbayMotors;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::discovery::SearchPage;
use crate::extract::{ExtractionFailure, ExtractionOutcome};
use crate::fetch::{FetchError, PageFetcher};
use crate::storage::LinkRecord;
use crate::{ConfigError, IngestError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The marketplaces this crate ingests from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Site {
    /// Cars & Bids: browser-rendered search, 30 results per page
    CarsAndBids,
    /// Bring a Trailer: JSON keyword-page API with explicit page counts
    BringATrailer,
    /// eBay Motors: browser-rendered saved searches, 240 results per page
    Ebay,
}

impl Site {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CarsAndBids => "cars-and-bids",
            Self::BringATrailer => "bring-a-trailer",
            Self::Ebay => "ebay",
        }
    }

    /// Whether extraction for this site needs a rendering browser session
    pub fn needs_browser(&self) -> bool {
        !matches!(self, Self::BringATrailer)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Site {
    type Err = ConfigError;

    /// Accepts the canonical names plus the short selectors used by the deployment
    /// (`cab`, `bat`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cars-and-bids" | "cab" => Ok(Self::CarsAndBids),
            "bring-a-trailer" | "bat" => Ok(Self::BringATrailer),
            "ebay" | "ebay-motors" => Ok(Self::Ebay),
            other => Err(ConfigError::UnknownSite(other.to_string())),
        }
    }
}

/// A saved eBay Motors search
///
/// Read-only input owned by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SavedSearch {
    pub id: i64,
    pub make: String,
    pub model: String,
    /// Year filter as eBay expects it, e.g. `2005|2006|2007`
    pub year_range: String,
    #[serde(default)]
    pub body_type: Option<String>,
    /// Pre-encoded make, used verbatim when eBay's own encoding differs from ours
    #[serde(default, rename = "make-encoded")]
    pub encoded_make: Option<String>,
    #[serde(default, rename = "model-encoded")]
    pub encoded_model: Option<String>,
}

/// A free-text Cars & Bids search
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchQuery {
    pub id: i64,
    pub query: String,
}

/// One unit of discovery input for a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriterion {
    /// eBay saved search
    Saved(SavedSearch),
    /// Free-text search string (Cars & Bids)
    Query { id: i64, query: String },
    /// Known keyword page identifier (Bring a Trailer)
    KeywordPage { id: i64 },
}

impl SearchCriterion {
    /// The id recorded on every link this criterion produces
    pub fn context_id(&self) -> i64 {
        match self {
            Self::Saved(search) => search.id,
            Self::Query { id, .. } => *id,
            Self::KeywordPage { id } => *id,
        }
    }
}

impl fmt::Display for SearchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved(s) => write!(f, "saved search {} ({} {} {})", s.id, s.make, s.model, s.year_range),
            Self::Query { id, query } => write!(f, "search {} ('{}')", id, query),
            Self::KeywordPage { id } => write!(f, "keyword page {}", id),
        }
    }
}

/// Collaborators a strategy may use while extracting one listing
#[derive(Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub artifacts: &'a dyn ArtifactStore,
}

/// The capability every marketplace implements
#[async_trait]
pub trait SiteStrategy: Send + Sync {
    /// Which site this strategy serves
    fn site(&self) -> Site;

    /// The discovery inputs for this run
    fn criteria(&self) -> Vec<SearchCriterion>;

    /// Fetches one page (1-based) of search results for `criterion`
    async fn search_page(
        &self,
        fetcher: &dyn PageFetcher,
        criterion: &SearchCriterion,
        page: u32,
    ) -> Result<SearchPage, FetchError>;

    /// Extracts one listing
    ///
    /// Per-listing problems come back as `Ok(ExtractionOutcome::Failed(..))`. An `Err`
    /// is reserved for failures of collaborators that must end the run.
    async fn extract(
        &self,
        link: &LinkRecord,
        ctx: ExtractionContext<'_>,
    ) -> Result<ExtractionOutcome, IngestError>;

    /// Classifies a fetch failure that happened while loading a listing page
    fn classify_failure(&self, error: &FetchError) -> ExtractionFailure {
        match error {
            FetchError::Session(message) => ExtractionFailure::SessionFailure(message.clone()),
            FetchError::Status { status, .. } if *status == 404 || *status == 410 => {
                ExtractionFailure::listing_issue(format!("Listing no longer available ({error})"))
            }
            FetchError::Decode { .. } => ExtractionFailure::listing_issue(error.to_string()),
            _ => ExtractionFailure::Transport(error.to_string()),
        }
    }
}

/// Builds the strategy for `site` from configuration
pub fn strategy_for(site: Site, config: &Config) -> Box<dyn SiteStrategy> {
    match site {
        Site::CarsAndBids => Box::new(CarsAndBids::new(config.cars_and_bids.searches.clone())),
        Site::BringATrailer => {
            Box::new(BringATrailer::new(config.bring_a_trailer.keyword_pages.clone()))
        }
        Site::Ebay => Box::new(EbayMotors::new(config.ebay.searches.clone())),
    }
}
