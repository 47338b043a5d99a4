//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait. A connection
//! is opened per logical operation, so a slow extraction never holds the database.

use crate::discovery::{ListingCandidate, ListingPreview};
use crate::extract::{AuctionRecord, VehicleAttributes};
use crate::sites::Site;
use crate::state::{LinkState, MAX_ATTEMPTS};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{AttemptRecorded, LinkRecord, RunCounts, RunRecord, RunStatus};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Maximum URLs bound into one existence query
const EXISTENCE_CHUNK: usize = 500;

const END_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const LINK_COLUMNS: &str = "id, site, url, state, attempt_count, last_error, search_context_id, \
     preview, discovered_at, processed_at";

/// SQLite storage backend
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    path: PathBuf,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `path` and applies the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

/// Link row as stored, before domain conversion
struct RawLink {
    id: String,
    site: String,
    url: String,
    state: String,
    attempt_count: u32,
    last_error: Option<String>,
    search_context_id: Option<i64>,
    preview: Option<String>,
    discovered_at: String,
    processed_at: Option<String>,
}

impl RawLink {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            site: row.get(1)?,
            url: row.get(2)?,
            state: row.get(3)?,
            attempt_count: row.get(4)?,
            last_error: row.get(5)?,
            search_context_id: row.get(6)?,
            preview: row.get(7)?,
            discovered_at: row.get(8)?,
            processed_at: row.get(9)?,
        })
    }

    fn into_record(self) -> StorageResult<LinkRecord> {
        let state = LinkState::from_db_string(&self.state)
            .ok_or_else(|| StorageError::InvalidState(format!("link state '{}'", self.state)))?;
        let preview = self
            .preview
            .as_deref()
            .map(serde_json::from_str::<ListingPreview>)
            .transpose()?;

        Ok(LinkRecord {
            id: parse_uuid(&self.id)?,
            site: parse_site(&self.site)?,
            url: self.url,
            state,
            attempt_count: self.attempt_count,
            last_error: self.last_error,
            search_context_id: self.search_context_id,
            preview,
            discovered_at: parse_timestamp(&self.discovered_at)?,
            processed_at: self.processed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StorageError::InvalidState(format!("uuid '{s}': {e}")))
}

fn parse_site(s: &str) -> StorageResult<Site> {
    Site::from_str(s).map_err(|e| StorageError::InvalidState(e.to_string()))
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidState(format!("timestamp '{s}': {e}")))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&self, site: Site, config_hash: &str) -> StorageResult<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO runs (site, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                site.as_str(),
                now(),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, status: RunStatus, counts: &RunCounts) -> StorageResult<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, discovered = ?3, new_links = ?4,
             processed = ?5, failed = ?6, skipped = ?7
             WHERE id = ?8",
            params![
                status.to_db_string(),
                now(),
                counts.discovered as i64,
                counts.new_links as i64,
                counts.processed as i64,
                counts.failed as i64,
                counts.skipped as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.connect()?;
        let run = conn
            .query_row(
                "SELECT id, site, started_at, finished_at, config_hash, status,
                 discovered, new_links, processed, failed, skipped
                 FROM runs WHERE id = ?1",
                params![run_id],
                |row| {
                    let status: String = row.get(5)?;
                    Ok(RunRecord {
                        id: row.get(0)?,
                        site: row.get(1)?,
                        started_at: row.get(2)?,
                        finished_at: row.get(3)?,
                        config_hash: row.get(4)?,
                        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Failed),
                        counts: RunCounts {
                            discovered: row.get::<_, i64>(6)? as u64,
                            new_links: row.get::<_, i64>(7)? as u64,
                            processed: row.get::<_, i64>(8)? as u64,
                            failed: row.get::<_, i64>(9)? as u64,
                            skipped: row.get::<_, i64>(10)? as u64,
                        },
                    })
                },
            )
            .optional()?;

        run.ok_or(StorageError::RunNotFound(run_id))
    }

    // ===== Links =====

    fn upsert_links(&self, candidates: &[ListingCandidate]) -> StorageResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO links (id, site, url, state, attempt_count, search_context_id, preview, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
                 ON CONFLICT(site, url) DO NOTHING",
            )?;

            for candidate in candidates {
                let preview = candidate
                    .preview
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                inserted += stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    candidate.site.as_str(),
                    candidate.url,
                    LinkState::Pending.to_db_string(),
                    candidate.search_context_id,
                    preview,
                    timestamp(candidate.discovered_at),
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn existing_urls(&self, site: Site, urls: &[String]) -> StorageResult<HashSet<String>> {
        let conn = self.connect()?;
        let mut existing = HashSet::new();

        for chunk in urls.chunks(EXISTENCE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT url FROM links WHERE site = ? AND url IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let values = std::iter::once(site.as_str()).chain(chunk.iter().map(String::as_str));
            let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
            for url in rows {
                existing.insert(url?);
            }
        }

        Ok(existing)
    }

    fn eligible_links(&self, site: Site) -> StorageResult<Vec<LinkRecord>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links
             WHERE site = ?1 AND state IN (?2, ?3) AND attempt_count < ?4
             ORDER BY discovered_at, rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                site.as_str(),
                LinkState::Pending.to_db_string(),
                LinkState::FailedRetryable.to_db_string(),
                MAX_ATTEMPTS
            ],
            RawLink::from_row,
        )?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?.into_record()?);
        }
        Ok(links)
    }

    fn get_link(&self, id: Uuid) -> StorageResult<LinkRecord> {
        let conn = self.connect()?;
        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1");
        let raw = conn
            .query_row(&sql, params![id.to_string()], RawLink::from_row)
            .optional()?;

        raw.ok_or(StorageError::LinkNotFound(id))?.into_record()
    }

    fn mark_link_processed(&self, id: Uuid) -> StorageResult<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE links SET state = ?1, processed_at = ?2, last_error = NULL WHERE id = ?3",
            params![LinkState::Processed.to_db_string(), now(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::LinkNotFound(id));
        }
        Ok(())
    }

    fn record_listing_issue(&self, id: Uuid, message: &str) -> StorageResult<AttemptRecorded> {
        let mut conn = self.connect()?;
        // IMMEDIATE takes the write lock up front, so a concurrent run cannot slip between
        // the guarded increment and the state write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let incremented = tx
            .query_row(
                "UPDATE links
                 SET attempt_count = attempt_count + 1, last_error = ?2
                 WHERE id = ?1 AND state IN (?3, ?4) AND attempt_count < ?5
                 RETURNING attempt_count",
                params![
                    id.to_string(),
                    message,
                    LinkState::Pending.to_db_string(),
                    LinkState::FailedRetryable.to_db_string(),
                    MAX_ATTEMPTS,
                ],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;

        let Some(attempt_count) = incremented else {
            drop(tx);
            let link = self.get_link(id)?;
            return Err(StorageError::InvalidState(format!(
                "link {} is {} with {} attempts",
                id, link.state, link.attempt_count
            )));
        };

        let state = LinkState::after_listing_issue(attempt_count);
        tx.execute(
            "UPDATE links SET state = ?1 WHERE id = ?2",
            params![state.to_db_string(), id.to_string()],
        )?;
        tx.commit()?;

        Ok(AttemptRecorded {
            state,
            attempt_count,
        })
    }

    fn note_link_error(&self, id: Uuid, message: &str) -> StorageResult<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE links SET last_error = ?1 WHERE id = ?2",
            params![message, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::LinkNotFound(id));
        }
        Ok(())
    }

    // ===== Auction Records =====

    fn upsert_record(&self, record: &AuctionRecord) -> StorageResult<()> {
        let conn = self.connect()?;
        let parameters = serde_json::to_string(&record.raw_parameters)?;
        let attrs = &record.attributes;

        conn.execute(
            "INSERT INTO auctions (link_id, site, url, year, make, model, price, end_date, ended,
                status_text, vin, mileage, title_status, location, seller, engine, drivetrain,
                transmission, body_style, exterior_color, interior_color, seller_type,
                parameters, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
             ON CONFLICT(link_id) DO UPDATE SET
                site = excluded.site,
                url = excluded.url,
                year = excluded.year,
                make = excluded.make,
                model = excluded.model,
                price = excluded.price,
                end_date = excluded.end_date,
                ended = excluded.ended,
                status_text = excluded.status_text,
                vin = excluded.vin,
                mileage = excluded.mileage,
                title_status = excluded.title_status,
                location = excluded.location,
                seller = excluded.seller,
                engine = excluded.engine,
                drivetrain = excluded.drivetrain,
                transmission = excluded.transmission,
                body_style = excluded.body_style,
                exterior_color = excluded.exterior_color,
                interior_color = excluded.interior_color,
                seller_type = excluded.seller_type,
                parameters = excluded.parameters,
                updated_at = excluded.updated_at",
            params![
                record.link_id.to_string(),
                record.site.as_str(),
                record.url,
                record.year,
                record.make,
                record.model,
                record.price.to_string(),
                record
                    .end_date
                    .map(|d| d.format(END_DATE_FORMAT).to_string()),
                record.ended,
                record.status_text,
                attrs.vin,
                attrs.mileage,
                attrs.title_status,
                attrs.location,
                attrs.seller,
                attrs.engine,
                attrs.drivetrain,
                attrs.transmission,
                attrs.body_style,
                attrs.exterior_color,
                attrs.interior_color,
                attrs.seller_type,
                parameters,
                now(),
            ],
        )?;
        Ok(())
    }

    fn get_record(&self, link_id: Uuid) -> StorageResult<Option<AuctionRecord>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT site, url, year, make, model, price, end_date, ended, status_text,
                 vin, mileage, title_status, location, seller, engine, drivetrain,
                 transmission, body_style, exterior_color, interior_color, seller_type,
                 parameters
                 FROM auctions WHERE link_id = ?1",
                params![link_id.to_string()],
                |row| {
                    let site: String = row.get(0)?;
                    let price: String = row.get(5)?;
                    let end_date: Option<String> = row.get(6)?;
                    let parameters: String = row.get(21)?;
                    let partial = AuctionRecord {
                        link_id,
                        site: Site::Ebay,
                        url: row.get(1)?,
                        year: row.get(2)?,
                        make: row.get(3)?,
                        model: row.get(4)?,
                        price: Decimal::ZERO,
                        end_date: None,
                        ended: row.get(7)?,
                        status_text: row.get(8)?,
                        attributes: VehicleAttributes {
                            vin: row.get(9)?,
                            mileage: row.get(10)?,
                            title_status: row.get(11)?,
                            location: row.get(12)?,
                            seller: row.get(13)?,
                            engine: row.get(14)?,
                            drivetrain: row.get(15)?,
                            transmission: row.get(16)?,
                            body_style: row.get(17)?,
                            exterior_color: row.get(18)?,
                            interior_color: row.get(19)?,
                            seller_type: row.get(20)?,
                        },
                        raw_parameters: BTreeMap::new(),
                    };
                    Ok((partial, site, price, end_date, parameters))
                },
            )
            .optional()?;

        let Some((mut record, site, price, end_date, parameters)) = row else {
            return Ok(None);
        };

        record.site = parse_site(&site)?;
        record.price = Decimal::from_str(&price)
            .map_err(|e| StorageError::Serialization(format!("price '{price}': {e}")))?;
        record.end_date = end_date
            .as_deref()
            .map(|d| NaiveDateTime::parse_from_str(d, END_DATE_FORMAT))
            .transpose()
            .map_err(|e| StorageError::Serialization(format!("end date: {e}")))?;
        record.raw_parameters = serde_json::from_str(&parameters)?;

        Ok(Some(record))
    }

    // ===== Statistics =====

    fn count_links_by_state(&self, site: Site, state: LinkState) -> StorageResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM links WHERE site = ?1 AND state = ?2",
            params![site.as_str(), state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_records(&self, site: Site) -> StorageResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM auctions WHERE site = ?1",
            params![site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
