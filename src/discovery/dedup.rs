use super::ListingCandidate;
use crate::sites::Site;
use crate::storage::{Storage, StorageResult};
use std::collections::HashSet;

/// Keeps only candidates whose URL is not yet stored for `site`
///
/// Duplicates within the batch collapse to their first occurrence. Existence is checked
/// with one batched query (chunked by the storage backend), never per URL. URLs must
/// already be normalized.
pub fn filter_new(
    storage: &dyn Storage,
    site: Site,
    candidates: Vec<ListingCandidate>,
) -> StorageResult<Vec<ListingCandidate>> {
    let mut seen = HashSet::new();
    let unique: Vec<ListingCandidate> = candidates
        .into_iter()
        .filter(|c| c.site == site && seen.insert(c.url.clone()))
        .collect();

    if unique.is_empty() {
        return Ok(unique);
    }

    let urls: Vec<String> = unique.iter().map(|c| c.url.clone()).collect();
    let existing = storage.existing_urls(site, &urls)?;

    Ok(unique
        .into_iter()
        .filter(|c| !existing.contains(&c.url))
        .collect())
}
