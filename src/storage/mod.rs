//! Storage module for persisting ingestion data
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Idempotent link insertion and batched existence checks
//! - The per-link retry ledger columns
//! - Auction record upserts
//! - Run audit rows

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::discovery::ListingPreview;
use crate::sites::Site;
use crate::state::LinkState;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Initializes or opens a storage database
pub fn open_storage(path: &std::path::Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A discovered listing URL with its processing state
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub id: Uuid,
    pub site: Site,
    pub url: String,
    pub state: LinkState,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// The saved search, query, or keyword page that produced this link
    pub search_context_id: Option<i64>,
    pub preview: Option<ListingPreview>,
    pub discovered_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Ledger state of a link after a listing-issue failure was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecorded {
    pub state: LinkState,
    pub attempt_count: u32,
}

/// Represents one pipeline run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub site: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counts: RunCounts,
}

/// Totals recorded on a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub discovered: u64,
    pub new_links: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    /// Stopped early because the browser session died
    Aborted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
