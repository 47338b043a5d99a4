//! Page fetching
//!
//! [`PageFetcher`] is the narrow interface the pipeline uses to get page content:
//! - `fetch_json` for JSON search APIs
//! - `render` for pages that need a browser to produce their DOM
//! - `screenshot` for rendered listing captures
//!
//! Two implementations exist: [`HttpFetcher`] (plain reqwest, no browser) and
//! [`BrowserlessFetcher`] (a remote headless Chrome service shared for the whole run).

mod browserless;
mod http;

pub use browserless::BrowserlessFetcher;
pub use http::{build_http_client, HttpFetcher};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The shared rendering session is dead or unusable
    #[error("Browser session failure: {0}")]
    Session(String),

    #[error("Operation not supported by this fetcher: {0}")]
    Unsupported(&'static str),
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if error.is_decode() {
            Self::Decode {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// A fetched page whose DOM can be queried
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// The URL that was requested
    pub url: String,
    /// Serialized DOM (rendered for browser fetches, raw for HTTP fetches)
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// Capability for getting page content
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a URL and decodes the body as JSON
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError>;

    /// Loads a URL and returns its DOM
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError>;

    /// Captures a PNG screenshot of a URL
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
