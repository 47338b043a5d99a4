//! Link discovery
//!
//! A [`Discoverer`] walks one search criterion page by page (1, 2, 3, …) and yields the
//! listing candidates found on each page. Termination is decided per site by the page's
//! [`PageSignal`]: a short page for browser-rendered searches, or an explicit
//! current/maximum page pair for JSON APIs.

mod dedup;

pub use dedup::filter_new;

use crate::fetch::{FetchError, PageFetcher};
use crate::sites::{SearchCriterion, Site, SiteStrategy};
use crate::url::normalize_listing_url;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Listing data carried by a search result, kept for sites that need it later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPreview {
    pub title: String,
    pub subtitle: String,
    /// Bid parsed leniently from the subtitle during the scan
    pub bid_value: Option<Decimal>,
}

/// A listing link as it appears on a search page
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLink {
    pub url: String,
    pub preview: Option<ListingPreview>,
}

impl DiscoveredLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            preview: None,
        }
    }
}

/// How a search page tells us whether more pages follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    /// A page with fewer items than `full_page_size` is the last one
    ShortPage { full_page_size: usize },
    /// The response states its own position and the last page number
    ExplicitMax { current: u32, maximum: u32 },
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub links: Vec<DiscoveredLink>,
    /// Number of result items on the page, including any that yielded no usable link
    pub item_count: usize,
    pub signal: PageSignal,
}

impl SearchPage {
    /// Returns true if no page follows this one
    pub fn is_last(&self) -> bool {
        if self.item_count == 0 {
            return true;
        }
        match self.signal {
            PageSignal::ShortPage { full_page_size } => self.item_count < full_page_size,
            PageSignal::ExplicitMax { current, maximum } => current >= maximum,
        }
    }
}

/// A normalized listing URL ready for deduplication
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCandidate {
    pub site: Site,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
    pub search_context_id: Option<i64>,
    pub preview: Option<ListingPreview>,
}

impl ListingCandidate {
    pub fn new(site: Site, url: impl Into<String>, search_context_id: Option<i64>) -> Self {
        Self {
            site,
            url: url.into(),
            discovered_at: Utc::now(),
            search_context_id,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Option<ListingPreview>) -> Self {
        self.preview = preview;
        self
    }
}

/// Everything one criterion produced
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<ListingCandidate>,
    pub pages_fetched: u32,
    /// The fetch failure that ended discovery early, if any
    pub error: Option<FetchError>,
}

/// Lazy paginated walk over one search criterion
pub struct Discoverer<'a> {
    strategy: &'a dyn SiteStrategy,
    fetcher: &'a dyn PageFetcher,
    criterion: &'a SearchCriterion,
    next_page: u32,
    max_pages: u32,
    page_delay: Duration,
    finished: bool,
}

impl<'a> Discoverer<'a> {
    pub fn new(
        strategy: &'a dyn SiteStrategy,
        fetcher: &'a dyn PageFetcher,
        criterion: &'a SearchCriterion,
    ) -> Self {
        Self {
            strategy,
            fetcher,
            criterion,
            next_page: 1,
            max_pages: u32::MAX,
            page_delay: Duration::ZERO,
            finished: false,
        }
    }

    /// Caps the number of pages requested
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Waits `delay` between page requests
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Fetches the next page, or returns `None` once the last page has been seen
    ///
    /// After an error the walk is over: later calls return `None`.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListingCandidate>>, FetchError> {
        if self.finished {
            return Ok(None);
        }
        if self.next_page > self.max_pages {
            tracing::warn!(
                "Stopping {} after {} pages (max-pages reached)",
                self.criterion,
                self.max_pages
            );
            self.finished = true;
            return Ok(None);
        }

        if self.next_page > 1 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        let page_number = self.next_page;
        let page = match self
            .strategy
            .search_page(self.fetcher, self.criterion, page_number)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        self.next_page += 1;
        if page.is_last() {
            self.finished = true;
        }

        tracing::debug!(
            "{} page {}: {} items, {} links",
            self.criterion,
            page_number,
            page.item_count,
            page.links.len()
        );

        Ok(Some(self.candidates_from(page)))
    }

    fn candidates_from(&self, page: SearchPage) -> Vec<ListingCandidate> {
        let site = self.strategy.site();
        let context = Some(self.criterion.context_id());

        page.links
            .into_iter()
            .filter_map(|link| match normalize_listing_url(&link.url) {
                Ok(url) => Some(ListingCandidate::new(site, url, context).with_preview(link.preview)),
                Err(e) => {
                    tracing::debug!("Ignoring listing link {}: {}", link.url, e);
                    None
                }
            })
            .collect()
    }

    /// Walks every page, keeping what was found before any failure
    pub async fn collect(mut self) -> Discovery {
        let mut discovery = Discovery::default();
        loop {
            match self.next_page().await {
                Ok(Some(mut candidates)) => {
                    discovery.pages_fetched += 1;
                    discovery.candidates.append(&mut candidates);
                }
                Ok(None) => break,
                Err(e) => {
                    discovery.error = Some(e);
                    break;
                }
            }
        }
        discovery
    }
}
