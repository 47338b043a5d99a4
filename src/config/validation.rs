use crate::config::types::{Config, NotifyConfig};
use crate::sites::Site;
use crate::{ConfigError, ConfigResult};
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_paths(config)?;
    validate_urls(config)?;
    validate_pipeline(config)?;
    validate_search_ids(config)?;
    Ok(())
}

fn validate_paths(config: &Config) -> ConfigResult<()> {
    if config.database.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }

    if config.artifacts.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "artifacts directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_urls(config: &Config) -> ConfigResult<()> {
    validate_http_url("browser endpoint", &config.browser.endpoint)?;

    if let Some(NotifyConfig { cache_url, .. }) = &config.notify {
        validate_http_url("notify cache-url", cache_url)?;
    }

    Ok(())
}

fn validate_http_url(what: &str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use HTTP or HTTPS",
            what, value
        )));
    }

    Ok(())
}

fn validate_pipeline(config: &Config) -> ConfigResult<()> {
    if config.pipeline.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.pipeline.max_pages
        )));
    }

    if config.http.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(site) = &config.pipeline.site {
        site.parse::<Site>()?;
    }

    Ok(())
}

fn validate_search_ids(config: &Config) -> ConfigResult<()> {
    unique_ids("ebay.searches", config.ebay.searches.iter().map(|s| s.id))?;
    unique_ids(
        "cars-and-bids.searches",
        config.cars_and_bids.searches.iter().map(|s| s.id),
    )?;
    unique_ids(
        "bring-a-trailer.keyword-pages",
        config.bring_a_trailer.keyword_pages.iter().copied(),
    )?;

    for search in &config.ebay.searches {
        if search.make.trim().is_empty() || search.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "ebay search {} needs both make and model",
                search.id
            )));
        }
    }

    for search in &config.cars_and_bids.searches {
        if search.query.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "cars-and-bids search {} has an empty query",
                search.id
            )));
        }
    }

    Ok(())
}

fn unique_ids(section: &str, ids: impl Iterator<Item = i64>) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ConfigError::Validation(format!(
                "duplicate id {} in {}",
                id, section
            )));
        }
    }
    Ok(())
}
