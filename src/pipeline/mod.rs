//! Pipeline module
//!
//! One [`Orchestrator`] drives one site's full run:
//! - Discovering listing links for every search criterion
//! - Deduplicating them against known links and inserting the new ones
//! - Extracting every eligible link in order, recording outcomes in the retry ledger
//! - Stopping the extraction batch when the rendering session dies

mod orchestrator;

pub use orchestrator::Orchestrator;

use crate::storage::RunCounts;

/// Totals for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Candidate URLs seen during discovery (after in-batch dedup)
    pub discovered: u64,
    /// Links inserted by this run
    pub new_links: u64,
    /// Links that ended the run processed with an auction record
    pub processed: u64,
    /// Listing issues recorded (each consumed one attempt)
    pub failed: u64,
    /// Links left eligible because the page lacked data for a record
    pub skipped: u64,
    /// Extractions interrupted by network trouble
    pub transport_errors: u64,
    /// Search criteria whose discovery ended on a fetch error
    pub discovery_failures: u64,
    /// Whether the extraction batch stopped on a dead session
    pub session_aborted: bool,
}

impl RunReport {
    /// Counts persisted on the run row
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            discovered: self.discovered,
            new_links: self.new_links,
            processed: self.processed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    /// True if part of the run's work could not be attempted
    ///
    /// Listing issues do not count: they are expected per-link outcomes.
    pub fn is_partial(&self) -> bool {
        self.session_aborted || self.discovery_failures > 0 || self.transport_errors > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_issues_are_not_partial() {
        let report = RunReport {
            processed: 3,
            failed: 2,
            ..Default::default()
        };
        assert!(!report.is_partial());
        assert_eq!(report.counts().failed, 2);
    }

    #[test]
    fn test_partial_runs() {
        let aborted = RunReport {
            session_aborted: true,
            ..Default::default()
        };
        let discovery = RunReport {
            discovery_failures: 1,
            ..Default::default()
        };
        assert!(aborted.is_partial());
        assert!(discovery.is_partial());
    }
}
