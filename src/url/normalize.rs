use crate::{UrlError, UrlResult};
use url::Url;

/// Query parameters that carry per-impression tracking data and never identify a listing
pub const TRACKING_PARAMS: &[&str] = &["amdata"];

/// Normalizes a listing URL for storage and deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Remove the fragment
/// 3. Drop tracking query parameters (see [`TRACKING_PARAMS`])
/// 4. Remove the query string entirely if nothing is left
///
/// All other parameters keep their original order and encoding, so the function is
/// idempotent: normalizing an already-normalized URL returns it unchanged.
///
/// # Examples
///
/// ```
/// use auction_ingest::url::normalize_listing_url;
///
/// let url = normalize_listing_url("https://x.com/item?foo=1&amdata=xyz&bar=2").unwrap();
/// assert_eq!(url, "https://x.com/item?foo=1&bar=2");
/// ```
pub fn normalize_listing_url(url_str: &str) -> UrlResult<String> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    url.set_fragment(None);

    if let Some(query) = url.query().map(str::to_owned) {
        let kept = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or_default();
                !TRACKING_PARAMS.contains(&key)
            })
            .collect::<Vec<_>>()
            .join("&");

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&kept));
        }
    }

    Ok(url.to_string())
}
