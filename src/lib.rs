//! Auction-Ingest: vehicle auction discovery and ingestion
//!
//! This crate discovers listing URLs from three auction marketplaces, records them as
//! links with a bounded-attempt retry ledger, extracts structured auction records from
//! each listing page, and persists everything idempotently into SQLite.

pub mod artifacts;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod sites;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Auction-Ingest operations
///
/// Anything surfacing as an `IngestError` from the pipeline is fatal for the current
/// run. Expected per-listing outcomes travel as [`extract::ExtractionOutcome`] instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Artifact store error: {0}")]
    Artifact(#[from] artifacts::ArtifactError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown site '{0}' (expected one of: cars-and-bids, bring-a-trailer, ebay)")]
    UnknownSite(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::{AuctionRecord, ExtractionFailure, ExtractionOutcome};
pub use pipeline::{Orchestrator, RunReport};
pub use sites::{SearchCriterion, Site, SiteStrategy};
pub use state::LinkState;
pub use url::normalize_listing_url;
