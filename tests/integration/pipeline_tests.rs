//! Integration tests for the ingest pipeline
//!
//! These tests use wiremock to stand in for the marketplaces and the rendering
//! service, and run full pipelines against a temporary SQLite database.

use auction_ingest::artifacts::FsArtifactStore;
use auction_ingest::config::HttpConfig;
use auction_ingest::discovery::ListingCandidate;
use auction_ingest::fetch::{build_http_client, BrowserlessFetcher, HttpFetcher};
use auction_ingest::pipeline::RunReport;
use auction_ingest::sites::{BringATrailer, EbayMotors};
use auction_ingest::storage::{RunStatus, SqliteStorage, Storage};
use auction_ingest::{LinkState, Orchestrator, Site};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEYWORD_FILTER: &str = "/wp-json/bringatrailer/1.0/data/keyword-filter";

fn http_config() -> HttpConfig {
    HttpConfig {
        user_agent: "TestIngest/1.0".to_string(),
        timeout_secs: 5,
    }
}

fn storage(dir: &TempDir) -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::new(&dir.path().join("ingest.db")).unwrap())
}

fn bat_listing_html(title: &str) -> String {
    format!(
        r#"<html><body>
        <h1 class="post-title listing-post-title">{title}</h1>
        <div><strong class="group-title-label">Seller</strong> enthusiast42</div>
        <div><strong class="group-title-label">Location</strong> Austin, Texas 78701</div>
        </body></html>"#
    )
}

/// Mounts a two-page keyword-filter API whose items point back at `server`
async fn mount_keyword_pages(server: &MockServer) {
    let base = server.uri();
    let page_one = serde_json::json!({
        "page_current": 1,
        "page_maximum": 2,
        "total": 4,
        "items": [
            {"url": format!("{base}/listing/1995-porsche-911-carrera/"), "title": "1995 Porsche 911 Carrera", "subtitle": "Sold for $45,000 on 3/4/24"},
            {"url": format!("{base}/listing/1989-bmw-m3/"), "title": "1989 BMW M3", "subtitle": "Withdrawn on 3/5/24"},
            {"url": format!("{base}/listing/1995-porsche-911-carrera/?amdata=tracking"), "title": "1995 Porsche 911 Carrera", "subtitle": "Sold for $45,000 on 3/4/24"}
        ]
    });
    let page_two = serde_json::json!({
        "page_current": 2,
        "page_maximum": 2,
        "total": 4,
        "items": [
            {"url": format!("{base}/listing/2004-honda-s2000/"), "title": "2004 Honda S2000", "subtitle": "Bid to $18,250 on 3/6/24"},
            {"url": format!("{base}/listing/1972-datsun-240z/"), "title": "1972 Datsun 240Z", "subtitle": "Sold for $30,000 on 3/7/24"}
        ]
    });

    Mock::given(method("GET"))
        .and(path(KEYWORD_FILTER))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_one))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEYWORD_FILTER))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_two))
        .mount(server)
        .await;
}

async fn mount_bat_listings(server: &MockServer) {
    for (slug, title) in [
        ("1995-porsche-911-carrera", "1995 Porsche 911 Carrera"),
        ("1989-bmw-m3", "1989 BMW M3"),
        ("2004-honda-s2000", "2004 Honda S2000"),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/listing/{slug}/")))
            .respond_with(ResponseTemplate::new(200).set_body_string(bat_listing_html(title)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/listing/1972-datsun-240z/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn bat_orchestrator(server: &MockServer, storage: Arc<SqliteStorage>, dir: &TempDir) -> Orchestrator {
    Orchestrator::new(
        Box::new(BringATrailer::new(vec![101]).with_api_base(server.uri())),
        storage,
        Arc::new(HttpFetcher::new(&http_config()).unwrap()),
        Arc::new(FsArtifactStore::new(dir.path().join("shots"))),
    )
    .with_max_pages(10)
    .with_config_hash("integration")
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let server = MockServer::start().await;
    mount_keyword_pages(&server).await;

    let dir = TempDir::new().unwrap();
    let storage = storage(&dir);
    let orchestrator = bat_orchestrator(&server, storage.clone(), &dir);

    let mut first = RunReport::default();
    orchestrator.discover(&mut first).await.unwrap();
    let mut second = RunReport::default();
    orchestrator.discover(&mut second).await.unwrap();

    // the tracking-parameter variant collapses onto the plain url
    assert_eq!(first.new_links, 4);
    assert_eq!(second.new_links, 0);
    assert_eq!(
        storage
            .count_links_by_state(Site::BringATrailer, LinkState::Pending)
            .unwrap(),
        4
    );

    let eligible = storage.eligible_links(Site::BringATrailer).unwrap();
    assert!(eligible.iter().all(|link| !link.url.contains("amdata")));
    assert!(eligible
        .iter()
        .all(|link| link.search_context_id == Some(101) && link.preview.is_some()));
}

#[tokio::test]
async fn test_bring_a_trailer_run() {
    let server = MockServer::start().await;
    mount_keyword_pages(&server).await;
    mount_bat_listings(&server).await;

    let dir = TempDir::new().unwrap();
    let storage = storage(&dir);
    let report = bat_orchestrator(&server, storage.clone(), &dir)
        .run()
        .await
        .unwrap();

    assert_eq!(report.new_links, 4);
    assert_eq!(report.processed, 2);
    // unknown subtitle status and the vanished listing
    assert_eq!(report.failed, 2);
    assert!(!report.is_partial());

    let run = storage.get_run(1).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "integration");

    assert_eq!(storage.count_records(Site::BringATrailer).unwrap(), 2);
    let bmw = storage
        .eligible_links(Site::BringATrailer)
        .unwrap()
        .into_iter()
        .find(|link| link.url.ends_with("/listing/1989-bmw-m3/"))
        .unwrap();
    assert_eq!(bmw.attempt_count, 1);
    assert_eq!(
        bmw.last_error.as_deref(),
        Some("Could not parse auction end status")
    );

    // a second run retries only the failed links and leaves records alone
    let again = bat_orchestrator(&server, storage.clone(), &dir)
        .run()
        .await
        .unwrap();
    assert_eq!(again.new_links, 0);
    assert_eq!(again.processed, 0);
    assert_eq!(again.failed, 2);
    assert_eq!(storage.count_records(Site::BringATrailer).unwrap(), 2);
}

#[tokio::test]
async fn test_bring_a_trailer_record_fields() {
    let server = MockServer::start().await;
    mount_keyword_pages(&server).await;
    mount_bat_listings(&server).await;

    let dir = TempDir::new().unwrap();
    let storage = storage(&dir);
    bat_orchestrator(&server, storage.clone(), &dir)
        .run()
        .await
        .unwrap();

    let porsche_url = format!("{}/listing/1995-porsche-911-carrera/", server.uri());
    let record = storage
        .get_record(link_id(&storage, &porsche_url))
        .unwrap()
        .unwrap();
    assert_eq!(record.year, 1995);
    assert_eq!(record.make, "porsche");
    assert_eq!(record.model, "911");
    assert_eq!(record.price, Decimal::new(45_000, 0));
    assert_eq!(record.ended, Some(true));
    assert_eq!(record.attributes.seller.as_deref(), Some("enthusiast42"));

    let honda_url = format!("{}/listing/2004-honda-s2000/", server.uri());
    let honda = storage.get_link(link_id(&storage, &honda_url)).unwrap();
    assert_eq!(honda.state, LinkState::Processed);
    let record = storage.get_record(honda.id).unwrap().unwrap();
    assert_eq!(record.ended, Some(false));
    assert_eq!(record.price, Decimal::new(18_250, 0));
}

fn ebay_listing_html(make: &str) -> String {
    format!(
        r#"<html><body>
        <div class="vim d-statusmessage">Bidding has ended on this item.</div>
        <div class="x-price-primary"><span class="ux-textspans">US $31,000.00</span></div>
        <div class="vim-buybox-wrapper"><span itemprop="price" content="31000.0">US $31,000.00</span></div>
        <div class="vim x-about-this-item">
            <div class="ux-layout-section__row">
                <div class="ux-labels-values__labels"><span class="ux-textspans">Year:</span></div>
                <div class="ux-labels-values__values"><span class="ux-textspans">2005</span></div>
                <div class="ux-labels-values__labels"><span class="ux-textspans">Make:</span></div>
                <div class="ux-labels-values__values"><span class="ux-textspans">{make}</span></div>
                <div class="ux-labels-values__labels"><span class="ux-textspans">Model:</span></div>
                <div class="ux-labels-values__values"><span class="ux-textspans">911</span></div>
            </div>
        </div>
        <div class="vi-bboxrev-posabs vi-bboxrev-dsplinline"><span id="bb_tlft">Apr 2, 2024 9:15 PM</span></div>
        </body></html>"#
    )
}

#[tokio::test]
async fn test_dead_session_stops_ebay_batch() {
    let browser = MockServer::start().await;
    let urls: Vec<String> = (1..=5)
        .map(|n| format!("https://www.ebay.com/itm/10000{n}"))
        .collect();
    let view = |url: &str| serde_json::json!({ "url": format!("{url}?orig_cvip=true") });

    for url in &urls[..2] {
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(body_json(view(url)))
            .respond_with(ResponseTemplate::new(200).set_body_string(ebay_listing_html("Porsche")))
            .expect(1)
            .mount(&browser)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/content"))
        .and(body_json(view(&urls[2])))
        .respond_with(ResponseTemplate::new(500).set_body_string("invalid session id"))
        .expect(1)
        .mount(&browser)
        .await;
    for url in &urls[3..] {
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(body_json(view(url)))
            .respond_with(ResponseTemplate::new(200).set_body_string(ebay_listing_html("Porsche")))
            .expect(0)
            .mount(&browser)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/screenshot"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
        .mount(&browser)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = storage(&dir);
    let candidates: Vec<ListingCandidate> = urls
        .iter()
        .map(|url| ListingCandidate::new(Site::Ebay, url.as_str(), Some(7)))
        .collect();
    storage.upsert_links(&candidates).unwrap();

    let fetcher = BrowserlessFetcher::with_client(
        build_http_client(&http_config()).unwrap(),
        &browser.uri(),
        None,
    );
    let shots = dir.path().join("shots");
    let report = Orchestrator::new(
        Box::new(EbayMotors::new(vec![])),
        storage.clone(),
        Arc::new(fetcher),
        Arc::new(FsArtifactStore::new(&shots)),
    )
    .run()
    .await
    .unwrap();

    assert!(report.session_aborted);
    assert!(report.is_partial());
    assert_eq!(report.processed, 2);
    assert_eq!(storage.get_run(1).unwrap().status, RunStatus::Aborted);

    let remaining = storage.eligible_links(Site::Ebay).unwrap();
    assert_eq!(remaining.len(), 3);
    for link in &remaining {
        assert_eq!(link.attempt_count, 0);
    }
    assert_eq!(remaining[0].url, urls[2]);
    assert!(remaining[1].last_error.is_none());
    assert!(remaining[2].last_error.is_none());

    let processed = storage
        .count_links_by_state(Site::Ebay, LinkState::Processed)
        .unwrap();
    assert_eq!(processed, 2);
    assert_eq!(std::fs::read_dir(&shots).unwrap().count(), 2);

    let record = storage
        .get_record(link_id(&storage, &urls[0]))
        .unwrap()
        .unwrap();
    assert_eq!(record.price, Decimal::new(31_000, 0));
    assert_eq!(record.year, 2005);
    assert_eq!(record.ended, Some(true));
}

/// Reads a link's id straight from the database file
fn link_id(storage: &SqliteStorage, url: &str) -> uuid::Uuid {
    let conn = rusqlite::Connection::open(storage.path()).unwrap();
    conn.query_row("SELECT id FROM links WHERE url = ?1", [url], |row| {
        row.get::<_, String>(0)
    })
    .map(|id| id.parse().unwrap())
    .unwrap()
}
