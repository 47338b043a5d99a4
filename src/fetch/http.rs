//! Plain HTTP fetcher
//!
//! Used for JSON APIs and for listing pages that are fully server-rendered. It has no
//! browser session, so it can never report a session failure.

use super::{FetchError, PageFetcher, RenderedPage};
use crate::config::HttpConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use auction_ingest::config::HttpConfig;
/// use auction_ingest::fetch::build_http_client;
///
/// let config = HttpConfig {
///     user_agent: "auction-ingest/1.0".to_string(),
///     timeout_secs: 30,
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        tracing::debug!("GET (json) {}", url);
        let response = self.get(url).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError> {
        tracing::debug!("GET (html) {}", url);
        let response = self.get(url).await?;
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(RenderedPage::new(url, html))
    }

    async fn screenshot(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Unsupported("screenshots need a browser"))
    }
}
