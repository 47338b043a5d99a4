//! URL handling module for Auction-Ingest
//!
//! Listing URLs are normalized once, at discovery time, and the normalized form is the
//! only form ever written to or compared against the `links` table.

mod normalize;

pub use normalize::{normalize_listing_url, TRACKING_PARAMS};

use crate::{UrlError, UrlResult};
use url::Url;

/// Resolves a possibly-relative href found on `base` and normalizes the result
///
/// Returns `None` for hrefs that should never become listing links:
/// - `javascript:`, `mailto:`, `tel:` and `data:` schemes
/// - fragment-only anchors
/// - anything that does not resolve to an HTTP(S) URL
pub fn resolve_listing_href(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    normalize_listing_url(absolute.as_str()).ok()
}

/// Appends a query parameter to a URL, preserving existing parameters
pub fn with_query_param(url_str: &str, key: &str, value: &str) -> UrlResult<String> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    url.query_pairs_mut().append_pair(key, value);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://carsandbids.com/search?page=1&q=porsche").unwrap()
    }

    #[test]
    fn test_resolve_relative_href() {
        let resolved = resolve_listing_href("/auctions/abc/2015-porsche-911", &base());
        assert_eq!(
            resolved.as_deref(),
            Some("https://carsandbids.com/auctions/abc/2015-porsche-911")
        );
    }

    #[test]
    fn test_resolve_strips_tracking_param() {
        let resolved =
            resolve_listing_href("https://www.ebay.com/itm/1234?hash=x&amdata=enc%3A1", &base());
        assert_eq!(
            resolved.as_deref(),
            Some("https://www.ebay.com/itm/1234?hash=x")
        );
    }

    #[test]
    fn test_resolve_rejects_special_schemes() {
        assert_eq!(resolve_listing_href("javascript:void(0)", &base()), None);
        assert_eq!(resolve_listing_href("mailto:a@b.com", &base()), None);
        assert_eq!(resolve_listing_href("#top", &base()), None);
        assert_eq!(resolve_listing_href("   ", &base()), None);
    }

    #[test]
    fn test_with_query_param_appends() {
        let url = with_query_param("https://www.ebay.com/itm/1?hash=x", "orig_cvip", "true")
            .unwrap();
        assert_eq!(url, "https://www.ebay.com/itm/1?hash=x&orig_cvip=true");

        let url = with_query_param("https://www.ebay.com/itm/1", "orig_cvip", "true").unwrap();
        assert_eq!(url, "https://www.ebay.com/itm/1?orig_cvip=true");
    }
}
