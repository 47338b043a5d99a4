//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::discovery::ListingCandidate;
use crate::extract::AuctionRecord;
use crate::sites::Site;
use crate::state::LinkState;
use crate::storage::{AttemptRecorded, LinkRecord, RunCounts, RunRecord, RunStatus};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Link not found: {0}")]
    LinkNotFound(Uuid),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid stored state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method is a single logical operation. Implementations must not hold a
/// connection or transaction open between calls.
pub trait Storage: Send + Sync {
    // ===== Run Management =====

    /// Creates a run row in `running` status and returns its id
    fn create_run(&self, site: Site, config_hash: &str) -> StorageResult<i64>;

    /// Sets a run's final status, counts, and finish time
    fn finish_run(&self, run_id: i64, status: RunStatus, counts: &RunCounts) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    // ===== Links =====

    /// Inserts candidates as `pending` links; existing `(site, url)` pairs are left alone
    ///
    /// Returns the number of rows actually inserted.
    fn upsert_links(&self, candidates: &[ListingCandidate]) -> StorageResult<usize>;

    /// Returns the subset of `urls` already stored for `site`
    fn existing_urls(&self, site: Site, urls: &[String]) -> StorageResult<HashSet<String>>;

    /// Links that may be extracted now, in discovery order
    fn eligible_links(&self, site: Site) -> StorageResult<Vec<LinkRecord>>;

    fn get_link(&self, id: Uuid) -> StorageResult<LinkRecord>;

    /// Marks a link processed after its record was persisted, clearing `last_error`
    fn mark_link_processed(&self, id: Uuid) -> StorageResult<()>;

    /// Consumes one attempt for a listing-issue failure
    ///
    /// The increment and the state change happen in one conditional statement, so two
    /// overlapping runs can never push a link past the attempt ceiling. Fails with
    /// [`StorageError::InvalidState`] when the link is no longer eligible.
    fn record_listing_issue(&self, id: Uuid, message: &str) -> StorageResult<AttemptRecorded>;

    /// Records an error on a link without consuming an attempt
    fn note_link_error(&self, id: Uuid, message: &str) -> StorageResult<()>;

    // ===== Auction Records =====

    /// Inserts or overwrites the record for `record.link_id`
    fn upsert_record(&self, record: &AuctionRecord) -> StorageResult<()>;

    fn get_record(&self, link_id: Uuid) -> StorageResult<Option<AuctionRecord>>;

    // ===== Statistics =====

    fn count_links_by_state(&self, site: Site, state: LinkState) -> StorageResult<u64>;

    fn count_records(&self, site: Site) -> StorageResult<u64>;
}
