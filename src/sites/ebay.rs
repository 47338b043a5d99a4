//! eBay Motors
//!
//! Discovery runs each saved search against the Cars & Trucks category with 240 results
//! per page. Listing pages are opened in the "original view", screenshotted into the
//! artifact store and then read from the rendered DOM.

use super::{ExtractionContext, SavedSearch, SearchCriterion, Site, SiteStrategy};
use crate::artifacts::PutOutcome;
use crate::discovery::{DiscoveredLink, PageSignal, SearchPage};
use crate::extract::dom::{css, require_text, text_of};
use crate::extract::fields::{parse_end_date, parse_mileage, parse_price};
use crate::extract::{AuctionRecord, ExtractionOutcome, ListingIssue, VehicleAttributes};
use crate::fetch::{FetchError, PageFetcher};
use crate::storage::LinkRecord;
use crate::url::{resolve_listing_href, with_query_param};
use crate::IngestError;
use async_trait::async_trait;
use scraper::Html;
use std::collections::BTreeMap;
use url::Url;

const SEARCH_BASE: &str = "https://www.ebay.com/sch/Cars-Trucks/6001/i.html";
const FULL_PAGE_SIZE: usize = 240;
const VIN_LABEL: &str = "VIN (Vehicle Identification Number)";

pub struct EbayMotors {
    searches: Vec<SavedSearch>,
}

impl EbayMotors {
    pub fn new(searches: Vec<SavedSearch>) -> Self {
        Self { searches }
    }
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Sold-listing search URL for one saved search
///
/// Pre-encoded make/model values are used verbatim; eBay double-encodes some
/// punctuation in its facet values.
fn search_url(search: &SavedSearch, page: u32) -> String {
    let make = search
        .encoded_make
        .clone()
        .unwrap_or_else(|| form_encode(&search.make));
    let model = search
        .encoded_model
        .clone()
        .unwrap_or_else(|| form_encode(&search.model));
    let body_type = search
        .body_type
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .map(|b| format!("&Body%2520Type={}", form_encode(b)))
        .unwrap_or_default();

    format!(
        "{SEARCH_BASE}?_dcat=6001&_fsrp=1&_vxp=mtr&_dmpt=US_Cars_Trucks&Transmission=-1{body_type}\
         &Make={make}&_ipg={FULL_PAGE_SIZE}&LH_Sold=1&_sofindtype=21&_sacat=6001&Model={model}\
         &_sop=12&fisc=c6001&_sadis=200&Model%2520Year={years}&LH_All=1&LH_PrefLoc=1&_pgn={page}",
        years = search.year_range,
    )
}

#[async_trait]
impl SiteStrategy for EbayMotors {
    fn site(&self) -> Site {
        Site::Ebay
    }

    fn criteria(&self) -> Vec<SearchCriterion> {
        self.searches
            .iter()
            .cloned()
            .map(SearchCriterion::Saved)
            .collect()
    }

    async fn search_page(
        &self,
        fetcher: &dyn PageFetcher,
        criterion: &SearchCriterion,
        page: u32,
    ) -> Result<SearchPage, FetchError> {
        let SearchCriterion::Saved(search) = criterion else {
            return Err(FetchError::Unsupported("eBay searches by saved search"));
        };

        let url = search_url(search, page);
        tracing::info!("Searching for links (url = {})", url);
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
        let view_url = with_query_param(&link.url, "orig_cvip", "true")?;

        let page = match ctx.fetcher.render(&view_url).await {
            Ok(page) => page,
            Err(e) => return Ok(self.classify_failure(&e).into()),
        };

        tracing::info!("Taking screenshot (link = {})", link.id);
        let shot = match ctx.fetcher.screenshot(&view_url).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(self.classify_failure(&e).into()),
        };
        let key = format!("{}.png", link.id);
        if ctx.artifacts.put(&key, &shot).await? == PutOutcome::AlreadyExists {
            tracing::debug!("Screenshot {} already stored", key);
        }

        let outcome = parse_listing(link, &page.html).unwrap_or_else(ExtractionOutcome::from);
        Ok(outcome)
    }
}

fn parse_search_page(html: &str, page_url: &str) -> Result<SearchPage, ListingIssue> {
    let base = Url::parse(page_url).map_err(|e| ListingIssue::new(e.to_string()))?;
    let doc = Html::parse_document(html);
    let link_sel = css("a.s-item__link")?;

    let mut item_count = 0;
    let mut links = Vec::new();
    for anchor in doc.select(&link_sel) {
        item_count += 1;
        if let Some(url) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_listing_href(href, &base))
        {
            links.push(DiscoveredLink::new(url));
        }
    }

    Ok(SearchPage {
        links,
        item_count,
        signal: PageSignal::ShortPage {
            full_page_size: FULL_PAGE_SIZE,
        },
    })
}

fn parse_listing(link: &LinkRecord, html: &str) -> Result<ExtractionOutcome, ListingIssue> {
    let doc = Html::parse_document(html);

    let status_text = require_text(&doc, "div.vim.d-statusmessage", "status message")?;
    let status = status_text.to_lowercase();
    if status.contains("relisted") {
        return Err(ListingIssue::new("Vehicle has been relisted"));
    }
    if status.contains("because the item was sold") {
        return Err(ListingIssue::new("Vehicle has been sold"));
    }

    let price = listing_price(&doc)?;
    let parameters = about_this_item(&doc)?;
    let end_date = end_time(&doc)?;

    let Some(year) = parameters
        .get("Year")
        .and_then(|y| y.trim().parse::<i32>().ok())
    else {
        tracing::warn!("Could not parse year (url = {})", link.url);
        return Ok(ExtractionOutcome::Skipped {
            reason: "Could not determine model year".to_string(),
        });
    };

    let make = required(&parameters, "Make")?;
    let model = required(&parameters, "Model")?;

    let attributes = VehicleAttributes {
        vin: parameters.get(VIN_LABEL).cloned(),
        mileage: parameters.get("Mileage").and_then(|m| parse_mileage(m)),
        title_status: parameters.get("Vehicle Title").cloned(),
        engine: parameters.get("Engine").cloned(),
        drivetrain: parameters.get("Drive Type").cloned(),
        transmission: parameters.get("Transmission").cloned(),
        body_style: parameters.get("Body Type").cloned(),
        exterior_color: parameters.get("Exterior Color").cloned(),
        interior_color: parameters.get("Interior Color").cloned(),
        ..Default::default()
    };

    Ok(ExtractionOutcome::extracted(AuctionRecord {
        link_id: link.id,
        site: Site::Ebay,
        url: link.url.clone(),
        year,
        make,
        model,
        price,
        end_date: Some(end_date),
        ended: Some(status.contains("ended")),
        status_text: Some(status_text),
        attributes,
        raw_parameters: parameters,
    }))
}

fn required(parameters: &BTreeMap<String, String>, label: &str) -> Result<String, ListingIssue> {
    parameters
        .get(label)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ListingIssue::new(format!("Could not find {}", label.to_lowercase())))
}

fn listing_price(doc: &Html) -> Result<rust_decimal::Decimal, ListingIssue> {
    let label_sel = css(".x-price-primary .ux-textspans")?;
    let struck = doc
        .select(&label_sel)
        .next()
        .and_then(|label| label.value().attr("class"))
        .is_some_and(|class| class.contains("ux-textspans--STRIKETHROUGH"));
    if struck {
        return Err(ListingIssue::new("Could not confirm price"));
    }

    let price_sel = css("div.vim-buybox-wrapper span[itemprop='price']")?;
    let content = doc
        .select(&price_sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .ok_or_else(|| ListingIssue::new("Could not find price"))?;
    parse_price(content)
}

/// Label/value pairs from the "About this item" section
fn about_this_item(doc: &Html) -> Result<BTreeMap<String, String>, ListingIssue> {
    let row_sel = css("div.vim.x-about-this-item div.ux-layout-section__row")?;
    let label_sel = css("div.ux-labels-values__labels span.ux-textspans")?;
    let value_sel = css("div.ux-labels-values__values span.ux-textspans")?;

    let mut parameters = BTreeMap::new();
    for row in doc.select(&row_sel) {
        let labels = row.select(&label_sel).map(text_of);
        let values = row.select(&value_sel).map(text_of);
        for (label, value) in labels.zip(values) {
            parameters.insert(label.replace(':', "").trim().to_string(), value);
        }
    }
    Ok(parameters)
}

fn end_time(doc: &Html) -> Result<chrono::NaiveDateTime, ListingIssue> {
    let primary = css("div.vi-bboxrev-posabs.vi-bboxrev-dsplinline > span#bb_tlft")?;
    let timer = css("div.vim.x-timer-module > span.x-timer-module__timer")?;

    let element = doc
        .select(&primary)
        .next()
        .or_else(|| doc.select(&timer).next())
        .ok_or_else(|| ListingIssue::new("Could not find end time element"))?;
    parse_end_date(&text_of(element))
}
