//! Per-link retry ledger
//!
//! Translates extraction outcomes into link state changes. Strategies never touch link
//! state themselves; everything flows through [`RetryLedger::record_outcome`].

use crate::extract::AuctionRecord;
use crate::state::LinkState;
use crate::storage::{Storage, StorageResult};
use std::sync::Arc;
use uuid::Uuid;

/// What happened to one link in this run
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// Extraction produced a record; persist it and mark the link processed
    Succeeded(Box<AuctionRecord>),
    /// Listing-level defect; consumes one attempt
    ListingIssue(String),
    /// Not enough data for a record; noted on the link, which stays eligible
    Skipped(String),
    /// Transport or session trouble; noted on the link without consuming an attempt
    Interrupted(String),
}

pub struct RetryLedger {
    storage: Arc<dyn Storage>,
}

impl RetryLedger {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Applies `outcome` to the link and returns the link's resulting state
    pub fn record_outcome(&self, link_id: Uuid, outcome: &LinkOutcome) -> StorageResult<LinkState> {
        match outcome {
            LinkOutcome::Succeeded(record) => {
                self.storage.upsert_record(record)?;
                self.storage.mark_link_processed(link_id)?;
                Ok(LinkState::Processed)
            }
            LinkOutcome::ListingIssue(message) => {
                let recorded = self.storage.record_listing_issue(link_id, message)?;
                if recorded.state == LinkState::FailedTerminal {
                    tracing::warn!(
                        "Link {} failed {} times and will not be retried: {}",
                        link_id,
                        recorded.attempt_count,
                        message
                    );
                }
                Ok(recorded.state)
            }
            LinkOutcome::Skipped(message) | LinkOutcome::Interrupted(message) => {
                self.storage.note_link_error(link_id, message)?;
                Ok(self.storage.get_link(link_id)?.state)
            }
        }
    }
}
