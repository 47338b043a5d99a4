//! End-of-run cache invalidation
//!
//! After a run the downstream API's cache is cleared with a single authenticated
//! `DELETE`. The call is fire-and-forget: failures are logged and never fail the run.

use crate::config::NotifyConfig;
use crate::IngestError;
use reqwest::Client;

const API_KEY_HEADER: &str = "X-Api-Key";

pub struct CacheNotifier {
    client: Client,
    cache_url: String,
    api_key: Option<String>,
}

impl CacheNotifier {
    pub fn new(client: Client, config: &NotifyConfig) -> Self {
        Self {
            client,
            cache_url: config.cache_url.clone(),
            api_key: config.api_key(),
        }
    }

    /// Sends the invalidation request
    pub async fn notify(&self) -> Result<(), IngestError> {
        let mut request = self.client.delete(&self.cache_url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Notify(format!(
                "{} returned {}",
                self.cache_url, status
            )));
        }
        Ok(())
    }

    /// Sends the invalidation request, logging the result
    pub async fn notify_best_effort(&self) {
        match self.notify().await {
            Ok(()) => tracing::info!("Cache cleared"),
            Err(e) => tracing::error!("Cache clear failed: {}", e),
        }
    }
}
