//! Cars & Bids
//!
//! Search results and listings are both browser-rendered. A search page holds at most
//! 30 auctions; a shorter page is the last one.

use super::{ExtractionContext, SearchCriterion, SearchQuery, Site, SiteStrategy};
use crate::discovery::{DiscoveredLink, PageSignal, SearchPage};
use crate::extract::dom::{css, first_text, non_empty, require_text, text_of};
use crate::extract::fields::{
    parse_end_date, parse_end_status, parse_mileage, parse_price, year_from_slug, year_in_text,
};
use crate::extract::{AuctionRecord, ExtractionOutcome, ListingIssue, VehicleAttributes};
use crate::fetch::{FetchError, PageFetcher};
use crate::storage::LinkRecord;
use crate::url::resolve_listing_href;
use crate::IngestError;
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use url::Url;

const SEARCH_URL: &str = "https://carsandbids.com/search";
const FULL_PAGE_SIZE: usize = 30;

pub struct CarsAndBids {
    searches: Vec<SearchQuery>,
}

impl CarsAndBids {
    pub fn new(searches: Vec<SearchQuery>) -> Self {
        Self { searches }
    }

    fn search_url(query: &str, page: u32) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        format!("{SEARCH_URL}?page={page}&q={encoded}")
    }
}

#[async_trait]
impl SiteStrategy for CarsAndBids {
    fn site(&self) -> Site {
        Site::CarsAndBids
    }

    fn criteria(&self) -> Vec<SearchCriterion> {
        self.searches
            .iter()
            .map(|s| SearchCriterion::Query {
                id: s.id,
                query: s.query.clone(),
            })
            .collect()
    }

    async fn search_page(
        &self,
        fetcher: &dyn PageFetcher,
        criterion: &SearchCriterion,
        page: u32,
    ) -> Result<SearchPage, FetchError> {
        let SearchCriterion::Query { query, .. } = criterion else {
            return Err(FetchError::Unsupported("Cars & Bids searches by query"));
        };

        let url = Self::search_url(query, page);
        let rendered = fetcher.render(&url).await?;
        parse_search_page(&rendered.html, &url).map_err(|issue| FetchError::Decode {
            url,
            message: issue.to_string(),
        })
    }

    async fn extract(
        &self,
        link: &LinkRecord,
        ctx: ExtractionContext<'_>,
    ) -> Result<ExtractionOutcome, IngestError> {
        let page = match ctx.fetcher.render(&link.url).await {
            Ok(page) => page,
            Err(e) => return Ok(self.classify_failure(&e).into()),
        };

        let outcome = parse_listing(link, &page.html).unwrap_or_else(ExtractionOutcome::from);
        Ok(outcome)
    }
}

fn parse_search_page(html: &str, page_url: &str) -> Result<SearchPage, ListingIssue> {
    let base = Url::parse(page_url).map_err(|e| ListingIssue::new(e.to_string()))?;
    let doc = Html::parse_document(html);
    let item_sel = css(".auction-item")?;
    let link_sel = css(".auction-title a[href]")?;

    let items: Vec<ElementRef<'_>> = doc.select(&item_sel).collect();
    let links = items
        .iter()
        .filter_map(|item| item.select(&link_sel).next())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_listing_href(href, &base))
        .map(DiscoveredLink::new)
        .collect();

    Ok(SearchPage {
        links,
        item_count: items.len(),
        signal: PageSignal::ShortPage {
            full_page_size: FULL_PAGE_SIZE,
        },
    })
}

fn parse_listing(link: &LinkRecord, html: &str) -> Result<ExtractionOutcome, ListingIssue> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, ".auction-title")?;
    let year = year_from_slug(&link.url).or_else(|| title.as_deref().and_then(year_in_text));
    let Some(year) = year else {
        return Ok(ExtractionOutcome::Skipped {
            reason: "Could not determine model year".to_string(),
        });
    };

    let status_text = require_text(&doc, ".end-time", "auction end time")?;
    let ended = parse_end_status(&status_text, &["ended"], &["ending"])?;
    let end_date = parse_end_date(&require_text(&doc, ".end-icon", "auction end date")?)?;

    let fact_sel = css(".quick-facts dd")?;
    let facts: Vec<ElementRef<'_>> = doc.select(&fact_sel).collect();
    let fact = |i: usize| facts.get(i).map(|f| text_of(*f)).and_then(non_empty);

    let make = fact(0).ok_or_else(|| ListingIssue::new("Could not parse make"))?;
    let model = facts
        .get(1)
        .and_then(|f| f.children().find_map(ElementRef::wrap))
        .map(text_of)
        .and_then(non_empty)
        .ok_or_else(|| ListingIssue::new("Could not parse model"))?;

    let mileage = fact(2).as_deref().and_then(parse_mileage);
    if mileage.is_none() {
        tracing::warn!("Could not parse mileage (url = {})", link.url);
    }

    let price = parse_price(&require_text(&doc, ".bid-value", "bid value")?)?;

    let attributes = VehicleAttributes {
        vin: fact(3),
        mileage,
        title_status: fact(4),
        location: fact(5),
        seller: fact(6),
        engine: fact(7),
        drivetrain: fact(8),
        transmission: fact(9),
        body_style: fact(10),
        exterior_color: fact(11),
        interior_color: fact(12),
        seller_type: fact(13),
    };

    Ok(ExtractionOutcome::extracted(AuctionRecord {
        link_id: link.id,
        site: Site::CarsAndBids,
        url: link.url.clone(),
        year,
        make,
        model,
        price,
        end_date: Some(end_date),
        ended: Some(ended),
        status_text: Some(status_text),
        attributes,
        raw_parameters: quick_facts(&doc)?,
    }))
}

/// Label/value pairs of the quick facts panel
fn quick_facts(doc: &Html) -> Result<BTreeMap<String, String>, ListingIssue> {
    let dt_sel = css(".quick-facts dt")?;
    let dd_sel = css(".quick-facts dd")?;
    Ok(doc
        .select(&dt_sel)
        .zip(doc.select(&dd_sel))
        .map(|(label, value)| (text_of(label), text_of(value)))
        .filter(|(label, _)| !label.is_empty())
        .collect())
}
