//! Bring a Trailer
//!
//! Discovery walks the keyword-filter JSON API, which reports its own page position.
//! Each result's title and subtitle are kept as the link's preview: the subtitle carries
//! the sale status, price, and date that the listing page itself does not expose in a
//! stable place. Listing pages are server-rendered and need no browser.

use super::{ExtractionContext, SearchCriterion, Site, SiteStrategy};
use crate::discovery::{DiscoveredLink, ListingPreview, PageSignal, SearchPage};
use crate::extract::dom::{css, non_empty, text_of};
use crate::extract::fields::{
    parse_end_status, parse_price, parse_price_lenient, parse_us_datetime, year_from_slug,
    year_in_text,
};
use crate::extract::{AuctionRecord, ExtractionOutcome, ListingIssue, VehicleAttributes};
use crate::fetch::{FetchError, PageFetcher};
use crate::storage::LinkRecord;
use crate::url::normalize_listing_url;
use crate::IngestError;
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

const API_BASE: &str = "https://bringatrailer.com";
const KEYWORD_FILTER_PATH: &str = "/wp-json/bringatrailer/1.0/data/keyword-filter";

/// One page of the keyword-filter API
#[derive(Debug, Deserialize)]
struct KeywordPage {
    page_current: u32,
    page_maximum: u32,
    #[serde(default)]
    total: u32,
    #[serde(default)]
    items: Vec<KeywordItem>,
}

#[derive(Debug, Deserialize)]
struct KeywordItem {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: String,
}

pub struct BringATrailer {
    keyword_pages: Vec<i64>,
    api_base: String,
}

impl BringATrailer {
    pub fn new(keyword_pages: Vec<i64>) -> Self {
        Self {
            keyword_pages,
            api_base: API_BASE.to_string(),
        }
    }

    /// Points discovery at another host serving the same API
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self, keyword_page: i64, page: u32) -> String {
        format!(
            "{}{}?bat_keyword_pages={}&sort=td&page={}&results=items",
            self.api_base, KEYWORD_FILTER_PATH, keyword_page, page
        )
    }
}

#[async_trait]
impl SiteStrategy for BringATrailer {
    fn site(&self) -> Site {
        Site::BringATrailer
    }

    fn criteria(&self) -> Vec<SearchCriterion> {
        self.keyword_pages
            .iter()
            .map(|&id| SearchCriterion::KeywordPage { id })
            .collect()
    }

    async fn search_page(
        &self,
        fetcher: &dyn PageFetcher,
        criterion: &SearchCriterion,
        page: u32,
    ) -> Result<SearchPage, FetchError> {
        let SearchCriterion::KeywordPage { id } = criterion else {
            return Err(FetchError::Unsupported("Bring a Trailer searches by keyword page"));
        };

        let url = self.search_url(*id, page);
        let value = fetcher.fetch_json(&url).await?;
        let body: KeywordPage = serde_json::from_value(value).map_err(|e| FetchError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            "Keyword page {} page {}/{} ({} total)",
            id,
            body.page_current,
            body.page_maximum,
            body.total
        );

        let item_count = body.items.len();
        let links = body
            .items
            .into_iter()
            .map(|item| DiscoveredLink {
                preview: Some(scan_preview(&item)),
                url: item.url,
            })
            .collect();

        Ok(SearchPage {
            links,
            item_count,
            signal: PageSignal::ExplicitMax {
                current: body.page_current,
                maximum: body.page_maximum,
            },
        })
    }

    async fn extract(
        &self,
        link: &LinkRecord,
        ctx: ExtractionContext<'_>,
    ) -> Result<ExtractionOutcome, IngestError> {
        let Some(preview) = link.preview.as_ref() else {
            return Ok(ListingIssue::new("Listing preview missing; cannot read sale status").into());
        };

        let page = match ctx.fetcher.render(&link.url).await {
            Ok(page) => page,
            Err(e) => return Ok(self.classify_failure(&e).into()),
        };

        let outcome =
            parse_listing(link, preview, &page.html).unwrap_or_else(ExtractionOutcome::from);
        Ok(outcome)
    }
}

/// Lightweight scan of a search result; never fails
fn scan_preview(item: &KeywordItem) -> ListingPreview {
    let bid_value = price_token(&item.subtitle).and_then(parse_price_lenient);
    if bid_value.is_none() {
        tracing::warn!("Could not parse bid value from '{}'", item.subtitle);
    }
    ListingPreview {
        title: item.title.clone(),
        subtitle: item.subtitle.clone(),
        bid_value,
    }
}

/// The price word of a subtitle such as `Sold for $45,000 on 3/4/24`
fn price_token(subtitle: &str) -> Option<&str> {
    let tokens: Vec<&str> = subtitle.split_whitespace().collect();
    tokens
        .iter()
        .skip(1)
        .find(|t| t.starts_with('$'))
        .or_else(|| tokens.get(2))
        .copied()
}

fn parse_listing(
    link: &LinkRecord,
    preview: &ListingPreview,
    html: &str,
) -> Result<ExtractionOutcome, ListingIssue> {
    let details = listing_details(html)?;

    let year = year_from_slug(&link.url).or_else(|| {
        details
            .get("Year")
            .and_then(|y| y.trim().parse::<i32>().ok())
    });
    let Some(year) = year else {
        tracing::warn!("Could not parse year (url = {})", link.url);
        return Ok(ExtractionOutcome::Skipped {
            reason: "Could not determine model year".to_string(),
        });
    };

    let (make, model) = make_model_from_slug(&link.url)
        .ok_or_else(|| ListingIssue::new("Could not parse make and model from url"))?;

    let subtitle = preview.subtitle.trim();
    let status_word = subtitle.split_whitespace().next().unwrap_or_default();
    let ended = parse_end_status(status_word, &["sold"], &["bid"])?;
    let price = parse_price(price_token(subtitle).unwrap_or_default())?;

    let end_date = parse_us_datetime(subtitle);
    if end_date.is_none() {
        tracing::warn!("Could not parse date {}", subtitle);
    }

    let attributes = VehicleAttributes {
        location: details.get("Location").cloned(),
        seller: details.get("Seller").cloned(),
        ..Default::default()
    };

    Ok(ExtractionOutcome::extracted(AuctionRecord {
        link_id: link.id,
        site: Site::BringATrailer,
        url: link.url.clone(),
        year,
        make,
        model,
        price,
        end_date,
        ended: Some(ended),
        status_text: Some(subtitle.to_string()),
        attributes,
        raw_parameters: details,
    }))
}

/// `/listing/1995-porsche-911-carrera/` yields (`porsche`, `911`)
fn make_model_from_slug(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(&normalize_listing_url(url).ok()?).ok()?;
    let slug = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let mut tokens = slug.split('-').skip(1);
    let make = tokens.next().filter(|t| !t.is_empty())?;
    let model = tokens.next().filter(|t| !t.is_empty())?;
    Some((make.to_string(), model.to_string()))
}

/// Label/value pairs of the listing's detail groups, plus the title's year as `Year`
fn listing_details(html: &str) -> Result<BTreeMap<String, String>, ListingIssue> {
    let doc = Html::parse_document(html);
    let label_sel = css("strong.group-title-label")?;
    let title_sel = css("h1.post-title")?;

    let mut details = BTreeMap::new();
    for label in doc.select(&label_sel) {
        let field = text_of(label);
        if let Some(value) = sibling_text(label) {
            details.entry(field).or_insert(value);
        }
    }

    if let Some(year) = doc
        .select(&title_sel)
        .next()
        .map(text_of)
        .as_deref()
        .and_then(year_in_text)
    {
        details.insert("Year".to_string(), year.to_string());
    }

    Ok(details)
}

fn sibling_text(element: ElementRef<'_>) -> Option<String> {
    let node = element.next_sibling()?;
    if let Some(text) = node.value().as_text() {
        return non_empty(text.trim().to_string());
    }
    ElementRef::wrap(node).map(text_of).and_then(non_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::FsArtifactStore;
    use crate::config::HttpConfig;
    use crate::extract::ExtractionFailure;
    use crate::fetch::HttpFetcher;
    use crate::state::LinkState;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn preview(subtitle: &str) -> ListingPreview {
        ListingPreview {
            title: "1995 Porsche 911 Carrera Coupe".to_string(),
            subtitle: subtitle.to_string(),
            bid_value: None,
        }
    }

    fn link(url: &str, subtitle: Option<&str>) -> LinkRecord {
        LinkRecord {
            id: Uuid::new_v4(),
            site: Site::BringATrailer,
            url: url.to_string(),
            state: LinkState::Pending,
            attempt_count: 0,
            last_error: None,
            search_context_id: Some(101),
            preview: subtitle.map(preview),
            discovered_at: Utc::now(),
            processed_at: None,
        }
    }

    const LISTING_HTML: &str = r#"<html><body>
        <h1 class="post-title listing-post-title">1995 Porsche 911 Carrera Coupe</h1>
        <div class="group-item-wrap">
            <strong class="group-title-label">Seller</strong> porschefan
        </div>
        <div class="group-item-wrap">
            <strong class="group-title-label">Location</strong><span>Portland, Oregon 97201</span>
        </div>
        <div class="group-item-wrap">
            <strong class="group-title-label">Lot</strong> #123456
        </div>
    </body></html>"#;

    const URL: &str = "https://bringatrailer.com/listing/1995-porsche-911-carrera/";

    fn http_fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpConfig {
            user_agent: "TestIngest/1.0".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_price_token() {
        assert_eq!(price_token("Sold for $45,000 on 3/4/24"), Some("$45,000"));
        assert_eq!(price_token("Sold for USD $45,000 on 3/4/24"), Some("$45,000"));
        assert_eq!(price_token("Bid to 12,000 on 1/2/23"), Some("12,000"));
        assert_eq!(price_token("Withdrawn"), None);
    }

    #[test]
    fn test_scan_preview_is_lenient() {
        let item = KeywordItem {
            url: URL.to_string(),
            title: "t".to_string(),
            subtitle: "Withdrawn on 3/4/24".to_string(),
        };
        assert_eq!(scan_preview(&item).bid_value, None);
    }

    #[test]
    fn test_make_model_from_slug() {
        assert_eq!(
            make_model_from_slug(URL),
            Some(("porsche".to_string(), "911".to_string()))
        );
        assert_eq!(
            make_model_from_slug("https://bringatrailer.com/listing/1995-porsche/"),
            None
        );
    }

    #[test]
    fn test_listing_details() {
        let details = listing_details(LISTING_HTML).unwrap();
        assert_eq!(details.get("Seller").map(String::as_str), Some("porschefan"));
        assert_eq!(
            details.get("Location").map(String::as_str),
            Some("Portland, Oregon 97201")
        );
        assert_eq!(details.get("Year").map(String::as_str), Some("1995"));
    }

    #[test]
    fn test_parse_sold_listing() {
        let link = link(URL, Some("Sold for $45,000 on 3/4/24"));
        let outcome = parse_listing(&link, link.preview.as_ref().unwrap(), LISTING_HTML).unwrap();
        let ExtractionOutcome::Extracted(record) = outcome else {
            panic!("expected a record");
        };

        assert_eq!(record.year, 1995);
        assert_eq!(record.make, "porsche");
        assert_eq!(record.model, "911");
        assert_eq!(record.price, Decimal::new(45_000, 0));
        assert_eq!(record.ended, Some(true));
        assert_eq!(
            record.end_date,
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(record.attributes.seller.as_deref(), Some("porschefan"));
        assert!(record.raw_parameters.contains_key("Lot"));
    }

    #[test]
    fn test_live_listing_with_unparseable_date() {
        let link = link(URL, Some("Bid to $12,000 soon"));
        let outcome = parse_listing(&link, link.preview.as_ref().unwrap(), LISTING_HTML).unwrap();
        let ExtractionOutcome::Extracted(record) = outcome else {
            panic!("expected a record");
        };
        assert_eq!(record.ended, Some(false));
        assert_eq!(record.end_date, None);
    }

    #[test]
    fn test_unknown_status_is_listing_issue() {
        let link = link(URL, Some("Withdrawn on 3/4/24"));
        assert!(parse_listing(&link, link.preview.as_ref().unwrap(), LISTING_HTML).is_err());
    }

    #[test]
    fn test_strict_price_in_deep_extraction() {
        let link = link(URL, Some("Sold for lots on 3/4/24"));
        let err = parse_listing(&link, link.preview.as_ref().unwrap(), LISTING_HTML).unwrap_err();
        assert_eq!(err, ListingIssue::new("Could not parse price"));
    }

    #[test]
    fn test_year_falls_back_to_title() {
        let link = link(
            "https://bringatrailer.com/listing/porsche-911-carrera/",
            Some("Sold for $45,000 on 3/4/24"),
        );
        let outcome = parse_listing(&link, link.preview.as_ref().unwrap(), LISTING_HTML).unwrap();
        let ExtractionOutcome::Extracted(record) = outcome else {
            panic!("expected a record");
        };
        assert_eq!(record.year, 1995);
        // slug tokens shift when the year is missing from the url
        assert_eq!(record.make, "911");
    }

    #[test]
    fn test_no_year_anywhere_is_skipped() {
        let link = link(
            "https://bringatrailer.com/listing/porsche-911-carrera/",
            Some("Sold for $45,000 on 3/4/24"),
        );
        let html = LISTING_HTML.replace("1995 ", "");
        let outcome = parse_listing(&link, link.preview.as_ref().unwrap(), &html).unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_search_page_uses_explicit_max() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEYWORD_FILTER_PATH))
            .and(query_param("bat_keyword_pages", "101"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "page_current": 2,
                "page_maximum": 2,
                "total": 3,
                "items": [
                    {"id": 1, "url": "https://bringatrailer.com/listing/1995-porsche-911/", "title": "1995 Porsche 911", "subtitle": "Sold for $45,000 on 3/4/24"},
                    {"id": 2, "url": "https://bringatrailer.com/listing/1989-bmw-m3/", "title": "1989 BMW M3", "subtitle": "Bid to $61,500 on 3/5/24"}
                ]
            })))
            .mount(&server)
            .await;

        let strategy = BringATrailer::new(vec![101]).with_api_base(server.uri());
        let page = strategy
            .search_page(&http_fetcher(), &SearchCriterion::KeywordPage { id: 101 }, 2)
            .await
            .unwrap();

        assert_eq!(page.item_count, 2);
        assert!(page.is_last());
        assert_eq!(
            page.links[1].preview.as_ref().unwrap().bid_value,
            Some(Decimal::new(61_500, 0))
        );
    }

    #[tokio::test]
    async fn test_search_page_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "nope"})))
            .mount(&server)
            .await;

        let strategy = BringATrailer::new(vec![101]).with_api_base(server.uri());
        let result = strategy
            .search_page(&http_fetcher(), &SearchCriterion::KeywordPage { id: 101 }, 1)
            .await;
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_extract_gone_listing_is_listing_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let artifacts = FsArtifactStore::new(dir.path());
        let fetcher = http_fetcher();
        let link = link(
            &format!("{}/listing/1995-porsche-911/", server.uri()),
            Some("Sold for $45,000 on 3/4/24"),
        );

        let outcome = BringATrailer::new(vec![])
            .extract(
                &link,
                ExtractionContext {
                    fetcher: &fetcher,
                    artifacts: &artifacts,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::Failed(ExtractionFailure::ListingIssue(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_without_preview() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifacts = FsArtifactStore::new(dir.path());
        let fetcher = http_fetcher();

        let outcome = BringATrailer::new(vec![])
            .extract(
                &link(URL, None),
                ExtractionContext {
                    fetcher: &fetcher,
                    artifacts: &artifacts,
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Failed(ExtractionFailure::ListingIssue(_))));
    }
}
