//! Statistics generation from the ingest database
//!
//! This module provides functionality for extracting and displaying
//! per-site link statistics from the storage layer.

use crate::sites::Site;
use crate::state::LinkState;
use crate::storage::{Storage, StorageResult};

/// Link statistics for one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatistics {
    pub site: Site,

    /// Total number of links known for the site
    pub total_links: u64,

    /// Count of links by state, in lifecycle order
    pub links_by_state: Vec<(LinkState, u64)>,

    /// Number of auction records stored
    pub records: u64,
}

impl LinkStatistics {
    pub fn count(&self, state: LinkState) -> u64 {
        self.links_by_state
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Links still waiting for a successful extraction
    pub fn outstanding(&self) -> u64 {
        self.links_by_state
            .iter()
            .filter(|(state, _)| state.is_eligible())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics for `site` from storage
pub fn load_statistics(storage: &dyn Storage, site: Site) -> StorageResult<LinkStatistics> {
    let mut links_by_state = Vec::new();
    for state in LinkState::persisted_states() {
        links_by_state.push((state, storage.count_links_by_state(site, state)?));
    }

    Ok(LinkStatistics {
        site,
        total_links: links_by_state.iter().map(|(_, count)| count).sum(),
        links_by_state,
        records: storage.count_records(site)?,
    })
}

/// Logs a one-line summary, used at the end of every run
pub fn log_statistics(stats: &LinkStatistics) {
    let states = stats
        .links_by_state
        .iter()
        .map(|(state, count)| format!("{}={}", state, count))
        .collect::<Vec<_>>()
        .join(", ");

    tracing::info!(
        "{}: {} links ({}), {} auction records",
        stats.site,
        stats.total_links,
        states,
        stats.records
    );
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LinkStatistics) {
    println!("=== {} ===\n", stats.site);

    println!("Links by State:");
    for (state, count) in &stats.links_by_state {
        let percentage = if stats.total_links > 0 {
            (*count as f64 / stats.total_links as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    println!("Auction records: {}", stats.records);
    println!("Awaiting extraction: {}", stats.outstanding());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ListingCandidate;
    use crate::storage::SqliteStorage;
    use tempfile::TempDir;

    #[test]
    fn test_load_statistics() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(&dir.path().join("ingest.db")).unwrap();
        storage
            .upsert_links(&[
                ListingCandidate::new(Site::Ebay, "https://www.ebay.com/itm/1", Some(1)),
                ListingCandidate::new(Site::Ebay, "https://www.ebay.com/itm/2", Some(1)),
                ListingCandidate::new(Site::CarsAndBids, "https://carsandbids.com/auctions/x", None),
            ])
            .unwrap();

        let link = storage.eligible_links(Site::Ebay).unwrap().remove(0);
        storage.record_listing_issue(link.id, "Could not confirm price").unwrap();

        let stats = load_statistics(&storage, Site::Ebay).unwrap();
        assert_eq!(stats.total_links, 2);
        assert_eq!(stats.count(LinkState::Pending), 1);
        assert_eq!(stats.count(LinkState::FailedRetryable), 1);
        assert_eq!(stats.outstanding(), 2);
        assert_eq!(stats.records, 0);
    }
}
