//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the ingestion database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per pipeline invocation
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    discovered INTEGER NOT NULL DEFAULT 0,
    new_links INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0
);

-- Every discovered listing URL and its retry ledger
CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    site TEXT NOT NULL,
    url TEXT NOT NULL,
    state TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    search_context_id INTEGER,
    preview TEXT,
    discovered_at TEXT NOT NULL,
    processed_at TEXT,
    UNIQUE(site, url)
);

CREATE INDEX IF NOT EXISTS idx_links_site_state ON links(site, state);

-- Extracted auctions, one per link
CREATE TABLE IF NOT EXISTS auctions (
    link_id TEXT PRIMARY KEY REFERENCES links(id),
    site TEXT NOT NULL,
    url TEXT NOT NULL,
    year INTEGER NOT NULL,
    make TEXT NOT NULL,
    model TEXT NOT NULL,
    price TEXT NOT NULL,
    end_date TEXT,
    ended INTEGER,
    status_text TEXT,
    vin TEXT,
    mileage INTEGER,
    title_status TEXT,
    location TEXT,
    seller TEXT,
    engine TEXT,
    drivetrain TEXT,
    transmission TEXT,
    body_style TEXT,
    exterior_color TEXT,
    interior_color TEXT,
    seller_type TEXT,
    parameters TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_auctions_site ON auctions(site);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
